//! Device-backed tests; each returns early when no adapter is available

use std::collections::BTreeMap;
use terrasketch_analysis::{BindingTable, ShaderModule, ShaderModuleBuilder, SimulationManifest, StageSet};
use terrasketch_wgpu::{BindGroupCache, Binding, BufferData, EngineConfig, EngineError, FULLSCREEN_QUAD, GpuContext, PipelineSet, ResourceMemory, Scalar, SimulationEngine, fullscreen_quad_layout};

const SIMULATE: &str = r#"
@group(0) @binding(0) var<uniform> params: vec4<f32>;
@group(0) @binding(1) var<storage, read> src: array<f32>;
@group(0) @binding(2) var<storage, read_write> dst: array<f32>;

@compute @workgroup_size({{WORKGROUP_SIZE}}, {{WORKGROUP_SIZE}})
fn simulate(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x + id.y * {{WORKGROUP_SIZE}}u;
    if i < arrayLength(&dst) {
        dst[i] = src[i] * params.x;
    }
}
"#;

const RENDER: &str = r#"
@group(0) @binding(0) var<uniform> params: vec4<f32>;
@group(0) @binding(1) var<storage, read> src: array<f32>;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(src[0] * params.x, 0.0, 0.0, 1.0);
}
"#;

fn context() -> Option<GpuContext> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut context = GpuContext::new();
    match pollster::block_on(context.init(None)) {
        Ok(_) => Some(context),
        Err(error) => {
            eprintln!("skipping: {error}");
            None
        }
    }
}

fn shaders() -> BTreeMap<String, ShaderModule> {
    let module = ShaderModuleBuilder::default().interpolation("WORKGROUP_SIZE", 8u32).build("simulate", SIMULATE).unwrap();
    BTreeMap::from([("simulate".to_string(), module)])
}

fn engine(context: &GpuContext) -> SimulationEngine {
    let config = EngineConfig {
        grid_size: (4, 1),
        ..Default::default()
    };
    SimulationEngine::new(context, shaders(), config).unwrap()
}

fn read_buffer(context: &GpuContext, buffer: &wgpu::Buffer) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let device = context.device()?;
    let queue = context.queue()?;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: buffer.size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer.size());
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |v| sender.send(v).unwrap());
    device.poll(wgpu::PollType::Wait)?;
    pollster::block_on(receiver.receive()).ok_or("failed to map buffer for reading")??;

    let data = slice.get_mapped_range().to_vec();
    Ok(data)
}

fn read_f32(context: &GpuContext, buffer: &wgpu::Buffer) -> Vec<f32> {
    let bytes = read_buffer(context, buffer).unwrap();
    let values: &[f32] = bytemuck::cast_slice(&bytes);
    values.to_vec()
}

#[test]
fn test_buffer_registration_and_scalars() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);

    let params = engine.create_buffer(0u32, [2.0f32, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(engine.scalar(params).unwrap(), Scalar::F32(2.0));

    engine.set_scalar(params, 0.5).unwrap();
    assert_eq!(engine.scalar(params).unwrap(), Scalar::F32(0.5));

    let counter = engine.create_buffer(1u32, vec![7i32]).unwrap();
    assert_eq!(engine.scalar(counter).unwrap(), Scalar::I32(7));

    let raw = engine.create_buffer(2u32, vec![0u8; 8]).unwrap();
    assert!(matches!(engine.scalar(raw), Err(EngineError::UnsupportedBufferKind(_))));

    assert!(matches!(engine.create_buffer(9u32, [0.0f32]), Err(EngineError::UnknownBinding(9))));
}

/// Tests that storage buffers follow the payload size on the GPU, growing and shrinking
#[test]
fn test_buffer_growth() {
    let Some(context) = context() else { return };
    let table = BindingTable::analyze(shaders().iter().map(|(name, module)| (name.as_str(), module))).unwrap();
    let mut memory = ResourceMemory::new(&context, table).unwrap();

    let state = memory.create_buffer(1u32, [1.0f32, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(memory.buffer(state).buffer().size(), 16);

    // a shorter payload must not leave the old tail visible to shaders
    assert!(memory.set(state, [9.0f32, 9.0]));
    assert_eq!(memory.buffer(state).generation(), 1);
    assert_eq!(memory.buffer(state).data(), &BufferData::F32(vec![9.0, 9.0]));
    assert_eq!(read_f32(&context, memory.buffer(state).buffer()), vec![9.0, 9.0]);

    assert!(memory.set(state, vec![1.0f32; 64]));
    assert_eq!(memory.buffer(state).generation(), 2);
    assert_eq!(memory.buffer(state).buffer().size(), 256);

    assert!(memory.write_binding(1, 5, BufferData::F32(vec![3.0; 8])).unwrap());
    assert_eq!(memory.scalar(state).unwrap(), Scalar::F32(3.0));
    assert_eq!(read_f32(&context, memory.buffer(state).buffer()), vec![3.0; 8]);
    assert!(matches!(memory.write_binding(2, 0, [0.0f32]), Err(EngineError::UnknownBinding(2))));

    // uniforms keep the size the shader declares
    let params = memory.create_buffer(0u32, [1.0f32, 2.0, 3.0, 4.0]).unwrap();
    memory.set_scalar(params, 0.5).unwrap();
    assert_eq!(memory.buffer(params).buffer().size(), 16);
    assert_eq!(memory.buffer(params).generation(), 0);
    assert_eq!(memory.scalar(params).unwrap(), Scalar::F32(0.5));
}

#[test]
fn test_duplicate_slot_is_rejected() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);

    engine.create_buffer(0u32, [1.0f32; 4]).unwrap();
    engine.create_buffer(1u32, [0.0f32; 4]).unwrap();
    engine.create_buffer(Binding::ping_pong(2, 1), [0.0f32; 4]).unwrap();

    // step 0 is fine, step 1 maps the ping-pong buffer onto slot 1 as well
    assert!(engine.create_bind_group_layout().is_ok());
    assert!(matches!(
        engine.memory().layout_entries(1),
        Err(EngineError::DuplicateBinding { slot: 1, step: 1 })
    ));
}

/// Tests that ping-pong steps alternate between exactly two cached bind groups
#[test]
fn test_ping_pong_bind_groups_are_step_scoped() {
    let Some(context) = context() else { return };
    let table = BindingTable::analyze(shaders().iter().map(|(name, module)| (name.as_str(), module))).unwrap();
    let mut memory = ResourceMemory::new(&context, table).unwrap();

    memory.create_buffer(0u32, [1.0f32; 4]).unwrap();
    let a = memory.create_buffer(Binding::ping_pong(1, 2), [1.0f32; 4]).unwrap();
    memory.create_buffer(Binding::ping_pong(2, 1), [0.0f32; 4]).unwrap();

    assert_ne!(memory.assignment(0).unwrap(), memory.assignment(1).unwrap());
    assert_eq!(memory.assignment(0).unwrap(), memory.assignment(2).unwrap());

    let layout = memory.create_bind_group_layout(0, "test").unwrap();
    let mut cache = BindGroupCache::default();
    for step in 0..6 {
        cache.get_or_create(&memory, &layout, step, "test").unwrap();
    }
    assert_eq!(cache.len(), 2);

    // reallocation changes the assignment key, forcing a rebuild
    memory.set(a, vec![1.0f32; 32]);
    cache.get_or_create(&memory, &layout, 0, "test").unwrap();
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_finalize_is_idempotent() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);
    engine.create_buffer(0u32, [1.0f32; 4]).unwrap();
    engine.create_buffer(1u32, [0.0f32; 4]).unwrap();
    engine.create_buffer(2u32, [0.0f32; 4]).unwrap();

    let first: *const PipelineSet = pollster::block_on(engine.finalize_pipelines()).unwrap();
    let second: *const PipelineSet = pollster::block_on(engine.finalize_pipelines()).unwrap();
    assert!(std::ptr::eq(first, second));

    let pipelines = engine.pipelines().unwrap();
    assert_eq!(pipelines.compute_names().collect::<Vec<_>>(), vec!["simulate"]);
    assert!(pipelines.render().is_none());

    let device = context.device().unwrap();
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("target"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    assert!(matches!(engine.render(&mut encoder, &view), Err(EngineError::NoRenderPipeline)));
}

/// Tests that the buffer set and layout cannot change under finalized pipelines
#[test]
fn test_finalized_engine_rejects_layout_changes() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);
    engine.create_buffer(0u32, [2.0f32, 0.0, 0.0, 0.0]).unwrap();
    let state = engine.create_buffer(1u32, [1.0f32; 4]).unwrap();
    engine.create_buffer(2u32, [0.0f32; 4]).unwrap();
    pollster::block_on(engine.finalize_pipelines()).unwrap();

    assert!(matches!(engine.create_buffer(1u32, [0.0f32; 4]), Err(EngineError::AlreadyFinalized(_))));
    assert!(matches!(engine.create_vertex_buffer(FULLSCREEN_QUAD, fullscreen_quad_layout()), Err(EngineError::AlreadyFinalized(_))));
    assert!(matches!(engine.create_bind_group_layout(), Err(EngineError::AlreadyFinalized(_))));
    assert_eq!(engine.memory().vertex_count(), 0);

    // contents may still change, including a reallocation
    engine.set_buffer(state, vec![1.0f32; 16]);
    let device = context.device().unwrap();
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    assert_eq!(engine.step(&mut encoder, ["simulate"]).unwrap(), 1);
    context.queue().unwrap().submit(std::iter::once(encoder.finish()));
    device.poll(wgpu::PollType::Wait).unwrap();
}

#[test]
fn test_dispatch_requires_finalized_pipelines() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);
    engine.create_buffer(0u32, [1.0f32; 4]).unwrap();
    engine.create_buffer(1u32, [0.0f32; 4]).unwrap();
    engine.create_buffer(2u32, [0.0f32; 4]).unwrap();

    let device = context.device().unwrap();
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    assert!(matches!(engine.dispatch_compute_pass(&mut encoder, "simulate"), Err(EngineError::NotFinalized)));

    pollster::block_on(engine.finalize_pipelines()).unwrap();
    assert!(matches!(engine.dispatch_compute_pass(&mut encoder, "erode"), Err(EngineError::UnknownComputeStage(_))));
}

/// Tests that two ping-pong steps feed the first step's output into the second
#[test]
fn test_steps_swap_ping_pong_buffers() {
    let Some(context) = context() else { return };
    let mut engine = engine(&context);

    engine.create_buffer(0u32, [2.0f32, 0.0, 0.0, 0.0]).unwrap();
    let a = engine.create_buffer(Binding::ping_pong(1, 2), [1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let b = engine.create_buffer(Binding::ping_pong(2, 1), [0.0f32; 4]).unwrap();
    pollster::block_on(engine.finalize_pipelines()).unwrap();

    let device = context.device().unwrap();
    let queue = context.queue().unwrap();
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    assert_eq!(engine.step(&mut encoder, ["simulate"]).unwrap(), 1);
    assert_eq!(engine.step(&mut encoder, ["simulate"]).unwrap(), 2);
    queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(read_f32(&context, engine.memory().buffer(b).buffer()), vec![2.0, 4.0, 6.0, 8.0]);
    assert_eq!(read_f32(&context, engine.memory().buffer(a).buffer()), vec![4.0, 8.0, 12.0, 16.0]);
}

/// Tests that the render pass draws the quad with the bind group of the current step
#[test]
fn test_render_pass_with_fullscreen_quad() {
    let Some(context) = context() else { return };
    let mut shaders = shaders();
    shaders.insert("render".to_string(), ShaderModule::new("render", RENDER).unwrap());
    let mut engine = SimulationEngine::new(&context, shaders, EngineConfig::default()).unwrap();
    engine.set_format(wgpu::TextureFormat::Rgba8Unorm);

    assert_eq!(engine.binding_table().get(0).unwrap().visibility, StageSet::COMPUTE | StageSet::FRAGMENT);
    assert_eq!(engine.binding_table().get(2).unwrap().visibility, StageSet::COMPUTE);

    engine.create_buffer(0u32, [2.0f32, 0.0, 0.0, 0.0]).unwrap();
    engine.create_buffer(Binding::ping_pong(1, 2), [0.25f32; 4]).unwrap();
    engine.create_buffer(Binding::ping_pong(2, 1), [0.0f32; 4]).unwrap();
    engine.create_vertex_buffer(FULLSCREEN_QUAD, fullscreen_quad_layout()).unwrap();
    assert_eq!(engine.memory().vertex_count(), 6);

    pollster::block_on(engine.finalize_pipelines()).unwrap();
    assert!(engine.pipelines().unwrap().render().is_some());

    // 64 texels of rgba8 fill exactly one 256-byte row
    let (width, height) = (64, 4);
    let device = context.device().unwrap();
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let pixels = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("pixels"),
        size: u64::from(width * height * 4),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    // the step writes 0.5 into the partner buffer, which the render then scales to 1.0
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    engine.step(&mut encoder, ["simulate"]).unwrap();
    engine.render(&mut encoder, &view).unwrap();
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &pixels,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue().unwrap().submit(std::iter::once(encoder.finish()));

    let bytes = read_buffer(&context, &pixels).unwrap();
    for pixel in bytes.chunks_exact(4) {
        assert_eq!(pixel, &[255, 0, 0, 255]);
    }
}

#[test]
fn test_engine_from_manifest() {
    let Some(context) = context() else { return };
    let manifest = SimulationManifest::from_yaml(
        r#"
id: scale
name: Scale
interpolations: { WORKGROUP_SIZE: 8 }
shaders:
  - { name: simulate, file: simulate.wgsl }
"#,
    )
    .unwrap();

    let engine = SimulationEngine::from_manifest(&context, &manifest, |_| Ok(SIMULATE.to_string()), (16, 9)).unwrap();
    assert_eq!(engine.dispatcher().workgroup_counts(), (2, 2));
    assert_eq!(engine.binding_table().len(), 3);
    assert_eq!(engine.current_step(), 0);
}
