//! Graphics context
//!
//! Owns adapter and device acquisition, which is the only asynchronous step of
//! the engine. Everything that needs the device goes through the accessors here,
//! which fail with [`EngineError::DeviceNotReady`] until [`GpuContext::init`] ran.

use crate::EngineError;

/// Adapter, device, queue and presentation format of one simulation session
#[derive(Debug)]
pub struct GpuContext {
    instance: wgpu::Instance,
    adapter: Option<wgpu::Adapter>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    format: Option<wgpu::TextureFormat>,
}

impl Default for GpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext {
    /// Creates an uninitialized context using every available backend
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self {
            instance,
            adapter: None,
            device: None,
            queue: None,
            format: None,
        }
    }

    /// Adopts a device created elsewhere
    ///
    /// # Arguments
    /// * `device` - The wgpu device
    /// * `queue` - The queue belonging to `device`
    /// * `format` - Presentation format, if the host already configured a surface
    pub fn with_device(device: wgpu::Device, queue: wgpu::Queue, format: Option<wgpu::TextureFormat>) -> Self {
        Self {
            device: Some(device),
            queue: Some(queue),
            format,
            ..Self::new()
        }
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    /// Acquires a high-performance adapter and a device; no-op when already initialized
    ///
    /// # Arguments
    /// * `compatible_surface` - Surface the adapter must be able to present to, if any
    pub async fn init(&mut self, compatible_surface: Option<&wgpu::Surface<'_>>) -> Result<&mut Self, EngineError> {
        if self.device.is_some() {
            return Ok(self);
        }

        let adapter = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await?;

        // Writable vertex-stage storage lets ping-pong state be read back while drawing
        let required_features = adapter.features() & wgpu::Features::VERTEX_WRITABLE_STORAGE;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("terrasketch"),
                required_features,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "acquired graphics device");

        self.adapter = Some(adapter);
        self.device = Some(device);
        self.queue = Some(queue);
        Ok(self)
    }

    /// Configures `surface` for presentation and records its format
    ///
    /// # Returns
    /// The presentation format chosen for the surface
    pub fn configure_surface(&mut self, surface: &wgpu::Surface<'_>, width: u32, height: u32) -> Result<wgpu::TextureFormat, EngineError> {
        let adapter = self.adapter.as_ref().ok_or(EngineError::DeviceNotReady("adapter not acquired; call init() first"))?;
        let device = self.device.as_ref().ok_or(EngineError::DeviceNotReady("device not acquired; call init() first"))?;
        let config = surface
            .get_default_config(adapter, width.max(1), height.max(1))
            .ok_or(EngineError::DeviceNotReady("surface is not supported by the adapter"))?;

        surface.configure(device, &config);
        self.format = Some(config.format);
        Ok(config.format)
    }

    pub fn is_ready(&self) -> bool {
        self.device.is_some() && self.queue.is_some()
    }

    pub fn device(&self) -> Result<&wgpu::Device, EngineError> {
        self.device.as_ref().ok_or(EngineError::DeviceNotReady("device not acquired; call init() first"))
    }

    pub fn queue(&self) -> Result<&wgpu::Queue, EngineError> {
        self.queue.as_ref().ok_or(EngineError::DeviceNotReady("queue not acquired; call init() first"))
    }

    /// Presentation format used as the render pipeline's color target
    pub fn format(&self) -> Result<wgpu::TextureFormat, EngineError> {
        self.format.ok_or(EngineError::DeviceNotReady("presentation format unknown; configure a surface first"))
    }

    /// Whether read-write storage buffers may be visible to the vertex stage
    pub fn vertex_writable_storage(&self) -> bool {
        self.device.as_ref().is_some_and(|device| device.features().contains(wgpu::Features::VERTEX_WRITABLE_STORAGE))
    }
}
