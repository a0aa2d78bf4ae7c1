//! Engine error taxonomy
//!
//! Every variant is fatal to the operation that raised it. Nothing is retried.

use terrasketch_analysis::{AnalysisError, BindingUsage, StageSet};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Shader preprocessing, reflection or merging failed
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// A buffer was requested for a binding no shader declares
    #[error("no shader declares binding {0}")]
    UnknownBinding(u32),

    /// A descriptor cannot be expressed as a bind group layout entry
    #[error("binding {binding} ({usage:?}, visible to {visibility:?}) cannot be mapped to a layout entry: {reason}")]
    UnsupportedResourceKind {
        binding: u32,
        usage: BindingUsage,
        visibility: StageSet,
        reason: &'static str,
    },

    /// The adapter, device or presentation surface is not initialized yet
    #[error("graphics context not ready: {0}")]
    DeviceNotReady(&'static str),

    /// A scalar accessor was used on a buffer that is not `f32` or `i32` typed
    #[error("scalar access requires an f32 or i32 buffer, found {0}")]
    UnsupportedBufferKind(&'static str),

    /// Two registered buffers resolve to the same slot at one step
    #[error("slot {slot} is bound twice at step {step}")]
    DuplicateBinding { slot: u32, step: u64 },

    /// Two shader modules export a compute entry point with the same name
    #[error("compute entry point '{0}' is declared by more than one shader")]
    DuplicateEntryPoint(String),

    /// More than one vertex or fragment entry point is available for the render pipeline
    #[error("render pipeline needs exactly one {0} entry point")]
    AmbiguousRenderStage(&'static str),

    /// No compute pipeline exists for the requested stage name
    #[error("no compute pipeline named '{0}'")]
    UnknownComputeStage(String),

    /// An operation needs pipelines that have not been finalized
    #[error("pipelines have not been finalized")]
    NotFinalized,

    /// The buffer set or bind group layout changed after pipelines were built against it
    #[error("pipelines are already finalized; {0} would invalidate them")]
    AlreadyFinalized(&'static str),

    /// The finalized pipeline set has no render pipeline
    #[error("no render pipeline; shaders need exactly one vertex and one fragment entry point")]
    NoRenderPipeline,

    /// Adapter acquisition failed
    #[error(transparent)]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    /// Device acquisition failed
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// The graphics API rejected an object; surfaced unmodified
    #[error(transparent)]
    Gpu(#[from] wgpu::Error),
}
