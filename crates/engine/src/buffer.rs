//! Buffer records
//!
//! A [`GpuBuffer`] couples one physical wgpu buffer with the host-side copy of
//! the data last written to it. The element kind of that copy decides whether
//! scalar access is possible.

use crate::EngineError;

/// Smallest allocation; wgpu rejects zero-sized bindings and wants 4-byte multiples
const MIN_BUFFER_SIZE: u64 = 4;

/// Host-side contents of a buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    /// Raw bytes, e.g. a `#[repr(C)]` struct cast with bytemuck
    Bytes(Vec<u8>),
}

impl BufferData {
    /// Wraps any plain-old-data value as raw bytes
    pub fn from_pod<T: bytemuck::Pod>(value: &T) -> Self {
        Self::Bytes(bytemuck::bytes_of(value).to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(values) => bytemuck::cast_slice(values),
            Self::I32(values) => bytemuck::cast_slice(values),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Name of the element kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::F32(_) => "f32",
            Self::I32(_) => "i32",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<Vec<f32>> for BufferData {
    fn from(values: Vec<f32>) -> Self {
        Self::F32(values)
    }
}

impl From<&[f32]> for BufferData {
    fn from(values: &[f32]) -> Self {
        Self::F32(values.to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for BufferData {
    fn from(values: [f32; N]) -> Self {
        Self::F32(values.to_vec())
    }
}

impl From<Vec<i32>> for BufferData {
    fn from(values: Vec<i32>) -> Self {
        Self::I32(values)
    }
}

impl From<&[i32]> for BufferData {
    fn from(values: &[i32]) -> Self {
        Self::I32(values.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for BufferData {
    fn from(values: [i32; N]) -> Self {
        Self::I32(values.to_vec())
    }
}

impl From<Vec<u8>> for BufferData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// First element of a scalar buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F32(f32),
    I32(i32),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::F32(value) => value.into(),
            Scalar::I32(value) => value.into(),
        }
    }
}

/// Reads the first element of `data`
pub fn read_scalar(data: &BufferData) -> Result<Scalar, EngineError> {
    match data {
        BufferData::F32(values) => Ok(Scalar::F32(values.first().copied().unwrap_or_default())),
        BufferData::I32(values) => Ok(Scalar::I32(values.first().copied().unwrap_or_default())),
        BufferData::Bytes(_) => Err(EngineError::UnsupportedBufferKind(data.kind_name())),
    }
}

/// Builds a one-element payload of the same element kind as `data`
pub fn scalar_like(data: &BufferData, value: f64) -> Result<BufferData, EngineError> {
    match data {
        BufferData::F32(_) => Ok(BufferData::F32(vec![value as f32])),
        BufferData::I32(_) => Ok(BufferData::I32(vec![value as i32])),
        BufferData::Bytes(_) => Err(EngineError::UnsupportedBufferKind(data.kind_name())),
    }
}

/// Allocation size for a payload of `byte_len` bytes
fn allocation_size(byte_len: u64) -> u64 {
    byte_len.max(MIN_BUFFER_SIZE).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// A physical GPU buffer plus the data last written to it
#[derive(Debug)]
pub struct GpuBuffer {
    label: String,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    data: BufferData,
    generation: u64,
}

impl GpuBuffer {
    /// Allocates a buffer sized to `data` and uploads it
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue, label: impl Into<String>, usage: wgpu::BufferUsages, data: BufferData) -> Self {
        let label = label.into();
        let buffer = Self::allocate(device, &label, usage, data.byte_len());
        let this = Self {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            buffer,
            data,
            generation: 0,
        };
        this.upload(queue);
        this
    }

    fn allocate(device: &wgpu::Device, label: &str, usage: wgpu::BufferUsages, byte_len: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: allocation_size(byte_len),
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn upload(&self, queue: &wgpu::Queue) {
        let bytes = self.data.as_bytes();
        // the allocation is 4-byte aligned; anything past the payload is zeroed
        if bytes.len() as u64 == self.buffer.size() {
            queue.write_buffer(&self.buffer, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(self.buffer.size() as usize, 0);
            queue.write_buffer(&self.buffer, 0, &padded);
        }
    }

    /// Overwrites the whole buffer
    ///
    /// The payload may differ in length from the previous one. A new physical
    /// buffer is allocated, and the generation bumped so bind groups referencing
    /// the old one get rebuilt, when the payload no longer fits or when a
    /// storage buffer changes size, so `arrayLength` follows the new contents.
    /// Other buffers keep their allocation on shrink with the tail zeroed, which
    /// keeps uniforms at the size the shader declares.
    ///
    /// # Returns
    /// `true` if the physical buffer was reallocated
    pub fn set(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: impl Into<BufferData>) -> bool {
        self.data = data.into();
        let needed = allocation_size(self.data.byte_len());
        let reallocated = if self.usage.contains(wgpu::BufferUsages::STORAGE) {
            needed != self.buffer.size()
        } else {
            needed > self.buffer.size()
        };
        if reallocated {
            self.buffer = Self::allocate(device, &self.label, self.usage, self.data.byte_len());
            self.generation += 1;
            tracing::debug!(label = %self.label, size = needed, generation = self.generation, "reallocated buffer");
        }
        self.upload(queue);
        reallocated
    }

    /// Overwrites the buffer with a single element of its current element kind
    pub fn set_scalar(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, value: f64) -> Result<(), EngineError> {
        let data = scalar_like(&self.data, value)?;
        self.set(device, queue, data);
        Ok(())
    }

    /// First element of the data last written
    pub fn scalar(&self) -> Result<Scalar, EngineError> {
        read_scalar(&self.data)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn data(&self) -> &BufferData {
        &self.data
    }

    /// Number of times the physical buffer was replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
