//! Resource memory manager
//!
//! Allocates one physical buffer per registered binding request, using the
//! merged descriptors of the [`BindingTable`] to pick usage flags and layout
//! entry types. Bind group layouts and bind groups are derived from the
//! registered buffers in registration order, resolving dynamic bindings
//! against the step supplied by the caller. A bind group built for one step is
//! only valid for steps resolving every binding to the same slot, which is what
//! [`BindGroupCache`] keys on.

use crate::{Binding, BufferData, EngineError, GpuBuffer, GpuContext, Scalar, VertexLayout};
use std::collections::HashSet;
use terrasketch_analysis::{BindingTable, BindingUsage, Stage, StageSet, VariableDescriptor};

/// Most bind groups kept per cache; ping-pong needs two
const MAX_CACHED_BIND_GROUPS: usize = 4;

/// Handle to a buffer registered with [`ResourceMemory::create_buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(usize);

/// Handle to a buffer registered with [`ResourceMemory::create_vertex_buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferHandle(usize);

/// Converts a stage set into wgpu shader stage flags
pub fn shader_stages(stages: StageSet) -> wgpu::ShaderStages {
    stages.iter().fold(wgpu::ShaderStages::NONE, |acc, stage| {
        acc | match stage {
            Stage::Compute => wgpu::ShaderStages::COMPUTE,
            Stage::Vertex => wgpu::ShaderStages::VERTEX,
            Stage::Fragment => wgpu::ShaderStages::FRAGMENT,
        }
    })
}

/// Buffer usage flags for a binding usage class
pub fn buffer_usages(usage: BindingUsage) -> wgpu::BufferUsages {
    match usage {
        BindingUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        BindingUsage::StorageReadOnly | BindingUsage::StorageReadWrite => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
    }
}

/// Maps a merged descriptor to a layout entry binding type
///
/// # Arguments
/// * `descriptor` - Merged requirements of the binding
/// * `vertex_writable_storage` - Whether the device allows writable storage in the vertex stage
pub fn layout_binding_type(descriptor: &VariableDescriptor, vertex_writable_storage: bool) -> Result<wgpu::BindingType, EngineError> {
    let ty = match descriptor.usage {
        BindingUsage::Uniform => wgpu::BufferBindingType::Uniform,
        BindingUsage::StorageReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
        BindingUsage::StorageReadWrite => {
            if descriptor.visibility.contains(Stage::Vertex) && !vertex_writable_storage {
                return Err(EngineError::UnsupportedResourceKind {
                    binding: descriptor.binding,
                    usage: descriptor.usage,
                    visibility: descriptor.visibility,
                    reason: "read-write storage is not available to the vertex stage on this device",
                });
            }
            wgpu::BufferBindingType::Storage { read_only: false }
        }
    };

    Ok(wgpu::BindingType::Buffer {
        ty,
        has_dynamic_offset: false,
        min_binding_size: None,
    })
}

/// A registered buffer together with the binding it was requested for
#[derive(Debug)]
struct BufferRecord {
    binding: Binding,
    buffer: GpuBuffer,
}

#[derive(Debug)]
struct VertexBufferRecord {
    buffer: GpuBuffer,
    layout: VertexLayout,
}

/// A registered buffer resolved to its slot at one step
#[derive(Debug, Clone, Copy)]
struct ResolvedEntry<'a> {
    slot: u32,
    index: usize,
    descriptor: &'a VariableDescriptor,
    buffer: &'a GpuBuffer,
}

/// Identity of one bind group entry: slot, registration index and buffer generation
pub type AssignmentKey = Vec<(u32, usize, u64)>;

/// Owner of every buffer bound by the simulation
#[derive(Debug)]
pub struct ResourceMemory {
    device: wgpu::Device,
    queue: wgpu::Queue,
    table: BindingTable,
    vertex_writable_storage: bool,
    records: Vec<BufferRecord>,
    vertex_buffers: Vec<VertexBufferRecord>,
}

impl ResourceMemory {
    /// Creates an empty memory manager for the merged bindings of `table`
    pub fn new(context: &GpuContext, table: BindingTable) -> Result<Self, EngineError> {
        Ok(Self {
            device: context.device()?.clone(),
            queue: context.queue()?.clone(),
            table,
            vertex_writable_storage: context.vertex_writable_storage(),
            records: Vec::new(),
            vertex_buffers: Vec::new(),
        })
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Allocates and registers a buffer for `binding`
    ///
    /// Dynamic bindings are looked up at step 0; both slots of a ping-pong pair
    /// carry the same usage class, and every slot is checked again when a layout
    /// is built for a concrete step.
    ///
    /// # Arguments
    /// * `binding` - Static slot or step resolver
    /// * `data` - Initial contents; the allocation is sized to it
    ///
    /// # Returns
    /// A handle to the new buffer, or `UnknownBinding` if no shader declares the slot
    pub fn create_buffer(&mut self, binding: impl Into<Binding>, data: impl Into<BufferData>) -> Result<BufferHandle, EngineError> {
        let binding = binding.into();
        let slot = binding.resolve(0);
        let descriptor = self.table.get(slot).ok_or(EngineError::UnknownBinding(slot))?;

        let label = if binding.is_dynamic() { format!("{} (slot {slot} at step 0)", descriptor.name) } else { descriptor.name.clone() };
        let buffer = GpuBuffer::new(&self.device, &self.queue, label, buffer_usages(descriptor.usage), data.into());
        tracing::debug!(label = buffer.label(), slot, usage = ?descriptor.usage, bytes = buffer.data().byte_len(), "registered buffer");

        self.records.push(BufferRecord { binding, buffer });
        Ok(BufferHandle(self.records.len() - 1))
    }

    /// Allocates and registers a vertex buffer
    ///
    /// Vertex buffers feed the render pipeline in registration order.
    pub fn create_vertex_buffer(&mut self, data: impl Into<BufferData>, layout: VertexLayout) -> VertexBufferHandle {
        let index = self.vertex_buffers.len();
        let buffer = GpuBuffer::new(&self.device, &self.queue, format!("vertex buffer {index}"), wgpu::BufferUsages::VERTEX, data.into());
        self.vertex_buffers.push(VertexBufferRecord { buffer, layout });
        VertexBufferHandle(index)
    }

    pub fn buffer(&self, handle: BufferHandle) -> &GpuBuffer {
        &self.records[handle.0].buffer
    }

    pub fn vertex_buffer(&self, handle: VertexBufferHandle) -> &GpuBuffer {
        &self.vertex_buffers[handle.0].buffer
    }

    /// Overwrites a registered buffer; see [`GpuBuffer::set`]
    pub fn set(&mut self, handle: BufferHandle, data: impl Into<BufferData>) -> bool {
        self.records[handle.0].buffer.set(&self.device, &self.queue, data)
    }

    /// Overwrites a vertex buffer; see [`GpuBuffer::set`]
    pub fn set_vertices(&mut self, handle: VertexBufferHandle, data: impl Into<BufferData>) -> bool {
        self.vertex_buffers[handle.0].buffer.set(&self.device, &self.queue, data)
    }

    pub fn set_scalar(&mut self, handle: BufferHandle, value: f64) -> Result<(), EngineError> {
        self.records[handle.0].buffer.set_scalar(&self.device, &self.queue, value)
    }

    pub fn scalar(&self, handle: BufferHandle) -> Result<Scalar, EngineError> {
        self.records[handle.0].buffer.scalar()
    }

    /// Overwrites whichever registered buffer occupies `slot` at `step`
    pub fn write_binding(&mut self, slot: u32, step: u64, data: impl Into<BufferData>) -> Result<bool, EngineError> {
        let record = self.records.iter_mut().find(|record| record.binding.resolve(step) == slot).ok_or(EngineError::UnknownBinding(slot))?;
        Ok(record.buffer.set(&self.device, &self.queue, data))
    }

    /// Resolves every registered buffer at `step`, in registration order
    fn resolve(&self, step: u64) -> Result<Vec<ResolvedEntry<'_>>, EngineError> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| -> Result<ResolvedEntry<'_>, EngineError> {
                let slot = record.binding.resolve(step);
                if !seen.insert(slot) {
                    return Err(EngineError::DuplicateBinding { slot, step });
                }
                let descriptor = self.table.get(slot).ok_or(EngineError::UnknownBinding(slot))?;
                Ok(ResolvedEntry {
                    slot,
                    index,
                    descriptor,
                    buffer: &record.buffer,
                })
            })
            .collect()
    }

    /// Slot assignment at `step`, identifying which bind group is valid for it
    pub fn assignment(&self, step: u64) -> Result<AssignmentKey, EngineError> {
        Ok(self.resolve(step)?.iter().map(|entry| (entry.slot, entry.index, entry.buffer.generation())).collect())
    }

    /// Layout entries for every registered buffer at `step`, sorted by slot
    pub fn layout_entries(&self, step: u64) -> Result<Vec<wgpu::BindGroupLayoutEntry>, EngineError> {
        let mut entries = self
            .resolve(step)?
            .iter()
            .map(|entry| -> Result<wgpu::BindGroupLayoutEntry, EngineError> {
                Ok(wgpu::BindGroupLayoutEntry {
                    binding: entry.slot,
                    visibility: shader_stages(entry.descriptor.visibility),
                    ty: layout_binding_type(entry.descriptor, self.vertex_writable_storage)?,
                    count: None,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        entries.sort_by_key(|entry| entry.binding);
        Ok(entries)
    }

    /// Builds the bind group layout from the buffers registered so far
    pub fn create_bind_group_layout(&self, step: u64, label: &str) -> Result<wgpu::BindGroupLayout, EngineError> {
        let entries = self.layout_entries(step)?;
        Ok(self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        }))
    }

    /// Builds the bind group for `step` against `layout`
    pub fn create_bind_group(&self, layout: &wgpu::BindGroupLayout, step: u64, label: &str) -> Result<wgpu::BindGroup, EngineError> {
        let resolved = self.resolve(step)?;
        let mut entries = resolved
            .iter()
            .map(|entry| wgpu::BindGroupEntry {
                binding: entry.slot,
                resource: entry.buffer.buffer().as_entire_binding(),
            })
            .collect::<Vec<_>>();

        entries.sort_by_key(|entry| entry.binding);

        tracing::debug!(label, step, entries = entries.len(), "created bind group");
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        }))
    }

    /// Layouts of every vertex buffer in registration order
    pub fn vertex_layouts(&self) -> impl Iterator<Item = &VertexLayout> {
        self.vertex_buffers.iter().map(|record| &record.layout)
    }

    /// Vertex buffers in registration order
    pub fn vertex_buffers(&self) -> impl Iterator<Item = &wgpu::Buffer> {
        self.vertex_buffers.iter().map(|record| record.buffer.buffer())
    }

    /// Number of vertices in the first vertex buffer
    pub fn vertex_count(&self) -> u32 {
        self.vertex_buffers
            .first()
            .filter(|record| record.layout.array_stride > 0)
            .map_or(0, |record| (record.buffer.data().byte_len() / record.layout.array_stride) as u32)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

/// Bind groups keyed by the slot assignment they were built for
///
/// Ping-pong bindings alternate between two assignments, so at most two groups
/// are built over a whole session unless a buffer is reallocated.
#[derive(Debug, Default)]
pub struct BindGroupCache {
    entries: Vec<(AssignmentKey, wgpu::BindGroup)>,
}

impl BindGroupCache {
    /// Returns the bind group valid for `step`, building it if needed
    pub fn get_or_create(&mut self, memory: &ResourceMemory, layout: &wgpu::BindGroupLayout, step: u64, label: &str) -> Result<&wgpu::BindGroup, EngineError> {
        let key = memory.assignment(step)?;
        let index = match self.entries.iter().position(|(cached, _)| *cached == key) {
            Some(index) => index,
            None => {
                let bind_group = memory.create_bind_group(layout, step, label)?;
                if self.entries.len() == MAX_CACHED_BIND_GROUPS {
                    self.entries.remove(0);
                }
                self.entries.push((key, bind_group));
                self.entries.len() - 1
            }
        };
        Ok(&self.entries[index].1)
    }

    /// Drops every cached bind group
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(usage: BindingUsage, visibility: StageSet) -> VariableDescriptor {
        VariableDescriptor {
            name: "state".into(),
            group: 0,
            binding: 6,
            usage,
            visibility,
        }
    }

    #[test]
    fn test_layout_binding_types() {
        let uniform = layout_binding_type(&descriptor(BindingUsage::Uniform, StageSet::VERTEX), false).unwrap();
        assert!(matches!(uniform, wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, .. }));

        let read_only = layout_binding_type(&descriptor(BindingUsage::StorageReadOnly, StageSet::VERTEX), false).unwrap();
        assert!(matches!(read_only, wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, .. }));

        let read_write = layout_binding_type(&descriptor(BindingUsage::StorageReadWrite, StageSet::COMPUTE | StageSet::FRAGMENT), false).unwrap();
        assert!(matches!(read_write, wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, .. }));
    }

    /// Tests that writable storage visible to the vertex stage is rejected unless the device supports it
    #[test]
    fn test_writable_vertex_storage_requires_feature() {
        let writable = descriptor(BindingUsage::StorageReadWrite, StageSet::COMPUTE | StageSet::VERTEX);
        assert!(matches!(layout_binding_type(&writable, false), Err(EngineError::UnsupportedResourceKind { binding: 6, .. })));
        assert!(layout_binding_type(&writable, true).is_ok());
    }

    #[test]
    fn test_stage_and_usage_flags() {
        assert_eq!(shader_stages(StageSet::COMPUTE | StageSet::FRAGMENT), wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT);
        assert_eq!(shader_stages(StageSet::NONE), wgpu::ShaderStages::NONE);
        assert!(buffer_usages(BindingUsage::Uniform).contains(wgpu::BufferUsages::UNIFORM));
        assert!(buffer_usages(BindingUsage::StorageReadOnly).contains(wgpu::BufferUsages::STORAGE));
    }
}
