//! Simulation engine facade
//!
//! Ties the shader set, the merged binding table, resource memory, the pipeline
//! builder and the dispatcher together around a single step counter. Setup
//! follows a fixed order: register buffers, build the bind group layout, then
//! finalize pipelines. After that, every [`SimulationEngine::step`] records the
//! requested compute passes against the bind group valid for the current step
//! and advances the counter.

use crate::{BindGroupCache, Binding, BufferData, BufferHandle, Dispatcher, EngineError, GpuContext, PipelineBuilder, PipelineSet, ResourceMemory, Scalar, VertexBufferHandle, VertexLayout};
use std::collections::BTreeMap;
use terrasketch_analysis::{BindingTable, DEFAULT_WORKGROUP_SIZE, ShaderModule, SimulationManifest};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Simulation grid dimensions (width, height)
    pub grid_size: (u32, u32),
    /// Workgroup edge length of the compute shaders
    pub workgroup_size: u32,
    /// Label prefix for every GPU object the engine creates
    pub label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: (1, 1),
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            label: "simulation".to_string(),
        }
    }
}

impl EngineConfig {
    /// Configuration for a manifest's simulation over a grid of `grid_size`
    pub fn from_manifest(manifest: &SimulationManifest, grid_size: (u32, u32)) -> Self {
        Self {
            grid_size,
            workgroup_size: manifest.workgroup_size,
            label: manifest.id.clone(),
        }
    }
}

/// One simulation session on one device
#[derive(Debug)]
pub struct SimulationEngine {
    label: String,
    shaders: BTreeMap<String, ShaderModule>,
    memory: ResourceMemory,
    format: Option<wgpu::TextureFormat>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_groups: BindGroupCache,
    pipelines: PipelineBuilder,
    dispatcher: Dispatcher,
    step: u64,
}

impl SimulationEngine {
    /// Analyzes `shaders` and prepares an empty session
    ///
    /// # Arguments
    /// * `context` - An initialized graphics context
    /// * `shaders` - Named shader modules of the simulation
    /// * `config` - Grid and workgroup configuration
    pub fn new(context: &GpuContext, shaders: BTreeMap<String, ShaderModule>, config: EngineConfig) -> Result<Self, EngineError> {
        let table = BindingTable::analyze(shaders.iter().map(|(name, module)| (name.as_str(), module)))?;
        tracing::debug!(label = %config.label, shaders = shaders.len(), bindings = table.len(), "analyzed shaders");

        Ok(Self {
            memory: ResourceMemory::new(context, table)?,
            format: context.format().ok(),
            bind_group_layout: None,
            bind_groups: BindGroupCache::default(),
            pipelines: PipelineBuilder::new(config.label.clone()),
            dispatcher: Dispatcher::new(config.grid_size, config.workgroup_size),
            label: config.label,
            shaders,
            step: 0,
        })
    }

    /// Builds the manifest's shaders and prepares a session for them
    ///
    /// # Arguments
    /// * `context` - An initialized graphics context
    /// * `manifest` - The simulation manifest
    /// * `load_shader_file` - Loads a file referenced by the manifest
    /// * `grid_size` - Simulation grid dimensions
    pub fn from_manifest(
        context: &GpuContext,
        manifest: &SimulationManifest,
        load_shader_file: impl Fn(&str) -> Result<String, std::io::Error>,
        grid_size: (u32, u32),
    ) -> Result<Self, EngineError> {
        let shaders = manifest.build_shaders(load_shader_file)?;
        Self::new(context, shaders, EngineConfig::from_manifest(manifest, grid_size))
    }

    pub fn binding_table(&self) -> &BindingTable {
        self.memory.table()
    }

    pub fn shaders(&self) -> &BTreeMap<String, ShaderModule> {
        &self.shaders
    }

    pub fn memory(&self) -> &ResourceMemory {
        &self.memory
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resizes the simulation grid; workgroup counts follow on the next dispatch
    pub fn set_grid_size(&mut self, grid_size: (u32, u32)) {
        self.dispatcher.set_grid_size(grid_size);
    }

    /// Sets the render target format, e.g. after configuring a surface late
    pub fn set_format(&mut self, format: wgpu::TextureFormat) {
        self.format = Some(format);
    }

    /// The step counter; its parity selects the ping-pong buffers in use
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// Fails with `AlreadyFinalized` once the pipelines exist
    fn ensure_not_finalized(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.pipelines.is_finalized() {
            return Err(EngineError::AlreadyFinalized(operation));
        }
        Ok(())
    }

    /// Registers a buffer; see [`ResourceMemory::create_buffer`]
    ///
    /// Only allowed before [`finalize_pipelines`](Self::finalize_pipelines),
    /// since the pipelines are built against the resulting layout.
    pub fn create_buffer(&mut self, binding: impl Into<Binding>, data: impl Into<BufferData>) -> Result<BufferHandle, EngineError> {
        self.ensure_not_finalized("registering a buffer")?;
        let handle = self.memory.create_buffer(binding, data)?;
        self.invalidate_layout();
        Ok(handle)
    }

    /// Registers a vertex buffer; see [`ResourceMemory::create_vertex_buffer`]
    ///
    /// Vertex layouts are baked into the render pipeline, so this is only
    /// allowed before finalization as well.
    pub fn create_vertex_buffer(&mut self, data: impl Into<BufferData>, layout: VertexLayout) -> Result<VertexBufferHandle, EngineError> {
        self.ensure_not_finalized("registering a vertex buffer")?;
        Ok(self.memory.create_vertex_buffer(data, layout))
    }

    /// Overwrites a registered buffer
    pub fn set_buffer(&mut self, handle: BufferHandle, data: impl Into<BufferData>) {
        self.memory.set(handle, data);
    }

    pub fn set_vertices(&mut self, handle: VertexBufferHandle, data: impl Into<BufferData>) {
        self.memory.set_vertices(handle, data);
    }

    pub fn set_scalar(&mut self, handle: BufferHandle, value: f64) -> Result<(), EngineError> {
        self.memory.set_scalar(handle, value)
    }

    pub fn scalar(&self, handle: BufferHandle) -> Result<Scalar, EngineError> {
        self.memory.scalar(handle)
    }

    /// Overwrites the buffer occupying `slot` at the current step
    pub fn write_binding(&mut self, slot: u32, data: impl Into<BufferData>) -> Result<(), EngineError> {
        self.memory.write_binding(slot, self.step, data)?;
        Ok(())
    }

    fn invalidate_layout(&mut self) {
        if self.bind_group_layout.take().is_some() {
            self.bind_groups.clear();
            tracing::debug!(label = %self.label, "buffer set changed; dropped bind group layout");
        }
    }

    /// Builds the bind group layout from the buffers registered so far
    ///
    /// The layout is kept by the engine and later consumed by
    /// [`finalize_pipelines`](Self::finalize_pipelines).
    pub fn create_bind_group_layout(&mut self) -> Result<&wgpu::BindGroupLayout, EngineError> {
        self.ensure_not_finalized("rebuilding the bind group layout")?;
        let layout = self.memory.create_bind_group_layout(self.step, &self.label)?;
        self.bind_groups.clear();
        let layout: &wgpu::BindGroupLayout = self.bind_group_layout.insert(layout);
        Ok(layout)
    }

    /// Bind group valid for the current step, built on first use
    pub fn create_bind_group(&mut self) -> Result<&wgpu::BindGroup, EngineError> {
        let layout = self.bind_group_layout.as_ref().ok_or(EngineError::NotFinalized)?;
        self.bind_groups.get_or_create(&self.memory, layout, self.step, &self.label)
    }

    /// Builds the pipeline set once; the bind group layout is created first if needed
    ///
    /// Afterwards the buffer set and layout are frozen: registering buffers or
    /// rebuilding the layout fails with `AlreadyFinalized`.
    pub async fn finalize_pipelines(&mut self) -> Result<&PipelineSet, EngineError> {
        if self.bind_group_layout.is_none() {
            self.create_bind_group_layout()?;
        }
        let layout = self.bind_group_layout.as_ref().ok_or(EngineError::NotFinalized)?;
        let vertex_layouts = self.memory.vertex_layouts().cloned().collect::<Vec<_>>();

        self.pipelines
            .finalize(
                self.memory.device(),
                self.shaders.iter().map(|(name, module)| (name.as_str(), module)),
                layout,
                &vertex_layouts,
                self.format,
            )
            .await
    }

    pub fn pipelines(&self) -> Option<&PipelineSet> {
        self.pipelines.pipelines()
    }

    /// Records one compute pass of the pipeline named `stage` at the current step
    pub fn dispatch_compute_pass(&mut self, encoder: &mut wgpu::CommandEncoder, stage: &str) -> Result<(), EngineError> {
        let pipelines = self.pipelines.pipelines().ok_or(EngineError::NotFinalized)?;
        let pipeline = pipelines.compute(stage).ok_or_else(|| EngineError::UnknownComputeStage(stage.to_string()))?;
        let layout = self.bind_group_layout.as_ref().ok_or(EngineError::NotFinalized)?;
        let bind_group = self.bind_groups.get_or_create(&self.memory, layout, self.step, &self.label)?;

        self.dispatcher.dispatch_compute(pipeline, encoder, bind_group);
        Ok(())
    }

    /// Records the named compute stages in order, then advances the step counter
    ///
    /// All stages of one call share the bind group of the current step, so they
    /// see the same ping-pong assignment.
    pub fn step<'s>(&mut self, encoder: &mut wgpu::CommandEncoder, stages: impl IntoIterator<Item = &'s str>) -> Result<u64, EngineError> {
        for stage in stages {
            self.dispatch_compute_pass(encoder, stage)?;
        }
        self.step += 1;
        Ok(self.step)
    }

    /// Records the render pass into `view` using the current step's bind group
    pub fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) -> Result<(), EngineError> {
        let pipelines = self.pipelines.pipelines().ok_or(EngineError::NotFinalized)?;
        let pipeline = pipelines.render().ok_or(EngineError::NoRenderPipeline)?;
        let layout = self.bind_group_layout.as_ref().ok_or(EngineError::NotFinalized)?;
        let bind_group = self.bind_groups.get_or_create(&self.memory, layout, self.step, &self.label)?;

        self.dispatcher.render(pipeline, encoder, view, bind_group, self.memory.vertex_buffers(), self.memory.vertex_count());
        Ok(())
    }
}
