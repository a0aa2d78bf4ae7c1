//! Merging of binding metadata across shader modules
//!
//! Several shader modules share one bind group layout. The analyzer folds their
//! reflected variables into a single immutable [`BindingTable`]:
//!
//! - the first module declaring a binding fixes its usage class and name
//! - access widens to read-write as soon as any module writes the binding
//! - visibility is the union of every contributing module's stages

use crate::{AnalysisError, ResourceKind, ShaderModule, StageSet, VariableInfo};
use serde::Serialize;
use std::collections::BTreeMap;

/// Usage class of a buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingUsage {
    Uniform,
    StorageReadOnly,
    StorageReadWrite,
}

impl BindingUsage {
    /// Returns true for both storage variants
    pub fn is_storage(self) -> bool {
        matches!(self, Self::StorageReadOnly | Self::StorageReadWrite)
    }

    fn from_kind(var: &VariableInfo) -> Result<Self, AnalysisError> {
        match &var.kind {
            ResourceKind::Uniform => Ok(Self::Uniform),
            ResourceKind::Storage { read_only: true } => Ok(Self::StorageReadOnly),
            ResourceKind::Storage { read_only: false } => Ok(Self::StorageReadWrite),
            ResourceKind::Unsupported(kind) => Err(AnalysisError::UnsupportedResourceKind {
                name: var.name.clone(),
                binding: var.binding,
                kind: kind.clone(),
            }),
        }
    }
}

/// Merged buffer requirements of one logical binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDescriptor {
    /// Name of the variable in the first module declaring it
    pub name: String,
    /// Bind group index
    pub group: u32,
    /// Binding index
    pub binding: u32,
    /// Usage class after access widening
    pub usage: BindingUsage,
    /// Union of all stages referencing the binding
    pub visibility: StageSet,
}

impl VariableDescriptor {
    pub fn is_read_only(&self) -> bool {
        self.usage != BindingUsage::StorageReadWrite
    }

    /// Folds one more module's declaration of the same binding into this descriptor
    fn merge(&mut self, shader: &str, var: &VariableInfo, usage: BindingUsage) {
        if self.usage.is_storage() != usage.is_storage() {
            // Mixing uniform and storage for one binding is undefined; keep the first class.
            tracing::warn!(
                binding = self.binding,
                shader,
                first = ?self.usage,
                conflicting = ?usage,
                "binding declared with conflicting usage classes"
            );
        } else if usage == BindingUsage::StorageReadWrite {
            self.usage = BindingUsage::StorageReadWrite;
        }
        self.visibility |= var.stages;
    }
}

/// Immutable mapping of binding index to merged descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BindingTable {
    descriptors: BTreeMap<u32, VariableDescriptor>,
}

impl BindingTable {
    /// Merges the bound variables of every module
    ///
    /// # Arguments
    /// * `shaders` - Named shader modules sharing one bind group layout
    ///
    /// # Returns
    /// The merged table, or `UnsupportedResourceKind` if any bound variable is not a buffer
    pub fn analyze<'a, I>(shaders: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = (&'a str, &'a ShaderModule)>,
    {
        let descriptors = shaders.into_iter().try_fold(BTreeMap::new(), |mut acc: BTreeMap<u32, VariableDescriptor>, (shader, module)| {
            for var in &module.reflection().variables {
                let usage = BindingUsage::from_kind(var)?;
                match acc.get_mut(&var.binding) {
                    Some(existing) => existing.merge(shader, var, usage),
                    None => {
                        acc.insert(
                            var.binding,
                            VariableDescriptor {
                                name: var.name.clone(),
                                group: var.group,
                                binding: var.binding,
                                usage,
                                visibility: var.stages,
                            },
                        );
                    }
                }
            }
            Ok::<_, AnalysisError>(acc)
        })?;

        Ok(Self { descriptors })
    }

    /// Merged requirements of `binding`, if any module declares it
    pub fn get(&self, binding: u32) -> Option<&VariableDescriptor> {
        self.descriptors.get(&binding)
    }

    pub fn contains(&self, binding: u32) -> bool {
        self.descriptors.contains_key(&binding)
    }

    /// Descriptors in ascending binding order
    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl<'a> IntoIterator for &'a BindingTable {
    type Item = &'a VariableDescriptor;
    type IntoIter = std::collections::btree_map::Values<'a, u32, VariableDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMULATE: &str = r#"
@group(0) @binding(0) var<uniform> grid: vec2f;
@group(0) @binding(1) var<storage, read> colors_in: array<f32>;
@group(0) @binding(2) var<storage, read_write> colors_out: array<f32>;

@compute @workgroup_size(8, 8)
fn simulate(@builtin(global_invocation_id) id: vec3u) {
    let i = id.y * u32(grid.x) + id.x;
    colors_out[i] = colors_in[i];
}
"#;

    const RENDER: &str = r#"
@group(0) @binding(0) var<uniform> grid: vec2f;
@group(0) @binding(1) var<storage, read> colors: array<f32>;
@group(0) @binding(2) var<storage, read> colors_next: array<f32>;

@vertex
fn vs(@builtin(vertex_index) index: u32) -> @builtin(position) vec4f {
    return vec4f(colors[index], grid.y, 0.0, 1.0);
}

@fragment
fn fs() -> @location(0) vec4f {
    return vec4f(colors_next[0], 0.0, 0.0, 1.0);
}
"#;

    fn module(name: &str, source: &str) -> ShaderModule {
        ShaderModule::new(name, source).unwrap()
    }

    /// Tests that read-write access survives a later read-only declaration
    #[test]
    fn test_read_write_wins() {
        let simulate = module("simulate", SIMULATE);
        let render = module("render", RENDER);

        let forward = BindingTable::analyze([("simulate", &simulate), ("render", &render)]).unwrap();
        let backward = BindingTable::analyze([("render", &render), ("simulate", &simulate)]).unwrap();

        for table in [&forward, &backward] {
            assert_eq!(table.get(1).unwrap().usage, BindingUsage::StorageReadOnly);
            assert_eq!(table.get(2).unwrap().usage, BindingUsage::StorageReadWrite);
            assert!(!table.get(2).unwrap().is_read_only());
        }
    }

    /// Tests that merged visibility is the union of every module's stages
    #[test]
    fn test_visibility_is_union() {
        let simulate = module("simulate", SIMULATE);
        let render = module("render", RENDER);
        let table = BindingTable::analyze([("simulate", &simulate), ("render", &render)]).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0).unwrap().visibility, StageSet::COMPUTE | StageSet::VERTEX);
        assert_eq!(table.get(1).unwrap().visibility, StageSet::COMPUTE | StageSet::VERTEX);
        assert_eq!(table.get(2).unwrap().visibility, StageSet::COMPUTE | StageSet::FRAGMENT);

        for descriptor in &table {
            let contributions = [&simulate, &render]
                .iter()
                .filter_map(|m| m.reflection().variable(descriptor.binding))
                .fold(StageSet::NONE, |acc, var| acc | var.stages);
            assert_eq!(descriptor.visibility, contributions);
        }
    }

    #[test]
    fn test_first_declaration_names_binding() {
        let simulate = module("simulate", SIMULATE);
        let render = module("render", RENDER);
        let table = BindingTable::analyze([("render", &render), ("simulate", &simulate)]).unwrap();
        assert_eq!(table.get(1).unwrap().name, "colors");
        assert!(!table.contains(7));
    }

    /// Tests that a uniform/storage conflict keeps the first usage class
    #[test]
    fn test_usage_conflict_keeps_first_class() {
        let uniform = module(
            "uniform",
            "@group(0) @binding(5) var<uniform> value: f32;\n@compute @workgroup_size(1) fn a() { let v = value; }",
        );
        let storage = module(
            "storage",
            "@group(0) @binding(5) var<storage, read_write> value: f32;\n@compute @workgroup_size(1) fn b() { value = 1.0; }",
        );
        let table = BindingTable::analyze([("uniform", &uniform), ("storage", &storage)]).unwrap();
        assert_eq!(table.get(5).unwrap().usage, BindingUsage::Uniform);
    }

    #[test]
    fn test_unsupported_resource_kind() {
        let sampled = module(
            "sampled",
            "@group(0) @binding(3) var smp: sampler;\n@group(0) @binding(4) var tex: texture_2d<f32>;\n@fragment fn fs() -> @location(0) vec4f { return textureSample(tex, smp, vec2f(0.0)); }",
        );
        let err = BindingTable::analyze([("sampled", &sampled)]).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedResourceKind { binding: 3, .. }));
    }
}
