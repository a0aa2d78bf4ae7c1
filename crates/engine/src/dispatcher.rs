//! Compute and render pass recording

use terrasketch_analysis::DEFAULT_WORKGROUP_SIZE;

/// Records passes over a simulation grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    /// Grid dimensions (width, height) in cells
    grid_size: (u32, u32),
    /// Workgroup edge length the compute shaders were written for
    workgroup_size: u32,
}

impl Dispatcher {
    /// Creates a dispatcher
    ///
    /// # Arguments
    /// * `grid_size` - Grid dimensions (width, height)
    /// * `workgroup_size` - Workgroup edge length; zero falls back to the default of 8
    pub fn new(grid_size: (u32, u32), workgroup_size: u32) -> Self {
        Self {
            grid_size,
            workgroup_size: if workgroup_size == 0 { DEFAULT_WORKGROUP_SIZE } else { workgroup_size },
        }
    }

    pub fn grid_size(&self) -> (u32, u32) {
        self.grid_size
    }

    /// Updates the grid dimensions, e.g. after the canvas was resized
    pub fn set_grid_size(&mut self, grid_size: (u32, u32)) {
        self.grid_size = grid_size;
    }

    /// Number of workgroups covering the grid in X and Y
    pub fn workgroup_counts(&self) -> (u32, u32) {
        (self.grid_size.0.div_ceil(self.workgroup_size), self.grid_size.1.div_ceil(self.workgroup_size))
    }

    /// Records one compute pass over the whole grid
    ///
    /// # Arguments
    /// * `pipeline` - The compute pipeline to run
    /// * `encoder` - The command encoder to record into
    /// * `bind_group` - Bind group for slot 0, valid for the current step
    pub fn dispatch_compute(&self, pipeline: &wgpu::ComputePipeline, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("simulation step"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, bind_group, &[]);

        let (workgroup_x, workgroup_y) = self.workgroup_counts();
        compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);
    }

    /// Records one render pass drawing `vertex_count` vertices into `view`
    ///
    /// # Arguments
    /// * `pipeline` - The render pipeline
    /// * `encoder` - The command encoder to record into
    /// * `view` - Color attachment, cleared to transparent black first
    /// * `bind_group` - Bind group for slot 0, valid for the current step
    /// * `vertex_buffers` - Vertex buffers in the order the pipeline expects them
    /// * `vertex_count` - Number of vertices to draw
    pub fn render<'b>(
        &self,
        pipeline: &wgpu::RenderPipeline,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
        vertex_buffers: impl IntoIterator<Item = &'b wgpu::Buffer>,
        vertex_count: u32,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("simulation render"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
            render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
        }
        render_pass.draw(0..vertex_count, 0..1);
    }
}
