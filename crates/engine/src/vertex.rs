//! Vertex buffer layouts

/// Owned description of one vertex buffer's layout
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    /// Bytes between consecutive elements
    pub array_stride: wgpu::BufferAddress,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexLayout {
    /// Tightly packed per-vertex layout with consecutive shader locations starting at `first_location`
    pub fn packed(first_location: u32, formats: &[wgpu::VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .zip(first_location..)
            .map(|(format, shader_location)| {
                let attribute = wgpu::VertexAttribute {
                    format: *format,
                    offset,
                    shader_location,
                };
                offset += format.size();
                attribute
            })
            .collect();

        Self {
            array_stride: offset,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }

    /// Borrowed form consumed by render pipeline descriptors
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

/// Two triangles covering clip space, as `float32x2` positions
#[rustfmt::skip]
pub const FULLSCREEN_QUAD: [f32; 12] = [
    // X,    Y
    -1.0, -1.0,
     1.0, -1.0,
     1.0,  1.0,

    -1.0, -1.0,
     1.0,  1.0,
    -1.0,  1.0,
];

/// Layout of [`FULLSCREEN_QUAD`] at shader location 0
pub fn fullscreen_quad_layout() -> VertexLayout {
    VertexLayout::packed(0, &[wgpu::VertexFormat::Float32x2])
}
