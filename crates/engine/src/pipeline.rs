//! Pipeline builder
//!
//! Builds the shared pipeline layout, one compute pipeline per compute entry
//! point and a single render pipeline from a set of shader modules. Creation is
//! expensive, so the result is built once per session and cached: later calls
//! to [`PipelineBuilder::finalize`] return the same [`PipelineSet`].

use crate::{EngineError, VertexLayout};
use std::collections::BTreeMap;
use terrasketch_analysis::{ShaderModule, Stage};

/// The pipelines consuming one bind group layout
#[derive(Debug)]
pub struct PipelineSet {
    layout: wgpu::PipelineLayout,
    compute: BTreeMap<String, wgpu::ComputePipeline>,
    render: Option<wgpu::RenderPipeline>,
}

impl PipelineSet {
    /// The pipeline layout shared by every pipeline in the set
    pub fn layout(&self) -> &wgpu::PipelineLayout {
        &self.layout
    }

    /// Compute pipeline for the entry point called `name`
    pub fn compute(&self, name: &str) -> Option<&wgpu::ComputePipeline> {
        self.compute.get(name)
    }

    /// Names of all compute pipelines in ascending order
    pub fn compute_names(&self) -> impl Iterator<Item = &str> {
        self.compute.keys().map(String::as_str)
    }

    pub fn render(&self) -> Option<&wgpu::RenderPipeline> {
        self.render.as_ref()
    }
}

/// An entry point located in one compiled module
struct StageEntry<'a> {
    module: usize,
    shader: &'a str,
    entry_point: &'a str,
}

/// Builds and caches the [`PipelineSet`] of a session
#[derive(Debug)]
pub struct PipelineBuilder {
    label: String,
    finalized: Option<PipelineSet>,
}

impl PipelineBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            finalized: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// The cached set, if [`finalize`](Self::finalize) already succeeded
    pub fn pipelines(&self) -> Option<&PipelineSet> {
        self.finalized.as_ref()
    }

    /// Builds every pipeline once; later calls return the cached set unchanged
    ///
    /// Object creation runs inside a validation error scope so that malformed
    /// shaders or incompatible layouts surface as [`EngineError::Gpu`] instead of
    /// the device's uncaptured error handler.
    ///
    /// # Arguments
    /// * `device` - The wgpu device
    /// * `shaders` - Named shader modules sharing `bind_group_layout`
    /// * `bind_group_layout` - The finalized layout of bind group 0
    /// * `vertex_layouts` - Layouts of the registered vertex buffers, in registration order
    /// * `target_format` - Color target of the render pipeline
    pub async fn finalize<'a>(
        &mut self,
        device: &wgpu::Device,
        shaders: impl IntoIterator<Item = (&'a str, &'a ShaderModule)>,
        bind_group_layout: &wgpu::BindGroupLayout,
        vertex_layouts: &[VertexLayout],
        target_format: Option<wgpu::TextureFormat>,
    ) -> Result<&PipelineSet, EngineError> {
        let set = match self.finalized.take() {
            Some(set) => set,
            None => {
                device.push_error_scope(wgpu::ErrorFilter::Validation);
                let built = self.build(device, shaders, bind_group_layout, vertex_layouts, target_format);
                let scope_error = device.pop_error_scope().await;
                let set = built?;
                if let Some(error) = scope_error {
                    return Err(error.into());
                }

                tracing::info!(
                    label = %self.label,
                    compute = set.compute.len(),
                    render = set.render.is_some(),
                    "finalized pipelines"
                );
                set
            }
        };
        let set: &PipelineSet = self.finalized.insert(set);
        Ok(set)
    }

    fn build<'a>(
        &self,
        device: &wgpu::Device,
        shaders: impl IntoIterator<Item = (&'a str, &'a ShaderModule)>,
        bind_group_layout: &wgpu::BindGroupLayout,
        vertex_layouts: &[VertexLayout],
        target_format: Option<wgpu::TextureFormat>,
    ) -> Result<PipelineSet, EngineError> {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&self.label),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        let shaders = shaders.into_iter().collect::<Vec<_>>();
        let modules = shaders
            .iter()
            .map(|&(name, module)| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(name),
                    source: wgpu::ShaderSource::Wgsl(module.code().into()),
                })
            })
            .collect::<Vec<_>>();

        let entries = |stage: Stage| {
            shaders
                .iter()
                .enumerate()
                .flat_map(move |(index, &(shader, module))| module.entry_points(stage).map(move |entry_point| StageEntry { module: index, shader, entry_point }))
                .collect::<Vec<_>>()
        };

        let mut compute = BTreeMap::new();
        for entry in entries(Stage::Compute) {
            if compute.contains_key(entry.entry_point) {
                return Err(EngineError::DuplicateEntryPoint(entry.entry_point.to_string()));
            }
            let label = format!("{} {}", entry.shader, entry.entry_point);
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&layout),
                module: &modules[entry.module],
                entry_point: Some(entry.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });
            compute.insert(entry.entry_point.to_string(), pipeline);
        }

        let render = match (single(entries(Stage::Vertex), "vertex")?, single(entries(Stage::Fragment), "fragment")?) {
            (Some(vertex), Some(fragment)) => {
                let format = target_format.ok_or(EngineError::DeviceNotReady("render pipeline needs a presentation format"))?;
                let buffers = vertex_layouts.iter().map(VertexLayout::as_wgpu).collect::<Vec<_>>();
                Some(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&self.label),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &modules[vertex.module],
                        entry_point: Some(vertex.entry_point),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &modules[fragment.module],
                        entry_point: Some(fragment.entry_point),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    multiview: None,
                    cache: None,
                }))
            }
            (None, None) => None,
            (vertex, _) => {
                let missing = if vertex.is_none() { "vertex" } else { "fragment" };
                tracing::warn!(label = %self.label, missing, "skipping render pipeline");
                None
            }
        };

        Ok(PipelineSet { layout, compute, render })
    }
}

/// At most one entry point of a render stage
fn single<'a>(mut entries: Vec<StageEntry<'a>>, stage: &'static str) -> Result<Option<StageEntry<'a>>, EngineError> {
    match entries.len() {
        0 => Ok(None),
        1 => Ok(entries.pop()),
        _ => Err(EngineError::AmbiguousRenderStage(stage)),
    }
}
