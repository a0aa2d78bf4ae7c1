//! wgpu resource binding and pipeline orchestration for grid simulations
//!
//! Buffers are registered against the merged bindings of a set of WGSL shader
//! modules, possibly under step-dependent slots for double buffering. From them
//! the engine derives one bind group layout, the compute and render pipelines
//! sharing it, and per-step bind groups, then records compute and render passes
//! over the simulation grid.

mod binding;
mod buffer;
mod context;
mod dispatcher;
mod engine;
mod error;
mod memory;
mod pipeline;
mod vertex;

pub use binding::{Binding, SlotResolver};
pub use buffer::{BufferData, GpuBuffer, Scalar};
pub use context::GpuContext;
pub use dispatcher::Dispatcher;
pub use engine::{EngineConfig, SimulationEngine};
pub use error::EngineError;
pub use memory::{AssignmentKey, BindGroupCache, BufferHandle, ResourceMemory, VertexBufferHandle, buffer_usages, layout_binding_type, shader_stages};
pub use pipeline::{PipelineBuilder, PipelineSet};
pub use vertex::{FULLSCREEN_QUAD, VertexLayout, fullscreen_quad_layout};

pub use terrasketch_analysis as analysis;
