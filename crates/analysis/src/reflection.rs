//! Static reflection of WGSL shader sources
//!
//! Uses `naga` to parse and validate a shader, then records every entry point and
//! every bound global variable together with the stages whose entry points
//! actually touch it (directly or through called helper functions).

use crate::{AnalysisError, Stage, StageSet};
use serde::Serialize;

/// Underlying resource kind of a bound global variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    /// `var<uniform>`
    Uniform,
    /// `var<storage, read>` or `var<storage, read_write>`
    Storage { read_only: bool },
    /// Anything else carrying a binding attribute (textures, samplers, ...)
    Unsupported(String),
}

/// An entry point declared by a shader module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPointInfo {
    /// Function name of the entry point
    pub name: String,
    /// Pipeline stage the entry point belongs to
    pub stage: Stage,
}

/// A bound global variable declared by a shader module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    /// Variable name, or `binding_N` for anonymous globals
    pub name: String,
    /// Bind group index from `@group`
    pub group: u32,
    /// Binding index from `@binding`
    pub binding: u32,
    /// Resource kind derived from the address space
    pub kind: ResourceKind,
    /// Stages whose entry points reference this variable
    pub stages: StageSet,
}

/// Reflected symbol table of one shader module
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShaderReflection {
    /// Entry points in declaration order
    pub entry_points: Vec<EntryPointInfo>,
    /// Bound variables in declaration order
    pub variables: Vec<VariableInfo>,
}

impl ShaderReflection {
    /// Parses, validates and reflects WGSL source
    ///
    /// # Arguments
    /// * `shader` - Name of the shader, used in diagnostics
    /// * `source` - WGSL source text with all placeholders already substituted
    ///
    /// # Returns
    /// The reflected symbol table, or a parse/validation error carrying naga's rendered diagnostic
    pub fn from_wgsl(shader: &str, source: &str) -> Result<Self, AnalysisError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| AnalysisError::Parse {
            shader: shader.to_string(),
            message: e.emit_to_string(source),
        })?;

        let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
        let info = validator.validate(&module).map_err(|e| AnalysisError::Validation {
            shader: shader.to_string(),
            message: e.emit_to_string(source),
        })?;

        let entry_points = module
            .entry_points
            .iter()
            .map(|ep| EntryPointInfo {
                name: ep.name.clone(),
                stage: Stage::from_naga(ep.stage),
            })
            .collect::<Vec<_>>();

        let variables = module
            .global_variables
            .iter()
            .filter_map(|(handle, var)| {
                let binding = var.binding.as_ref()?;

                // A stage sees the variable if any of its entry points uses it
                let stages = entry_points
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !info.get_entry_point(*index)[handle].is_empty())
                    .map(|(_, ep)| ep.stage)
                    .collect::<StageSet>();

                Some(VariableInfo {
                    name: var.name.clone().unwrap_or_else(|| format!("binding_{}", binding.binding)),
                    group: binding.group,
                    binding: binding.binding,
                    kind: resource_kind(var.space),
                    stages,
                })
            })
            .collect();

        Ok(Self { entry_points, variables })
    }

    /// Returns the entry points belonging to `stage`
    pub fn entry_points_for(&self, stage: Stage) -> impl Iterator<Item = &EntryPointInfo> {
        self.entry_points.iter().filter(move |ep| ep.stage == stage)
    }

    /// Looks up a bound variable by binding index
    pub fn variable(&self, binding: u32) -> Option<&VariableInfo> {
        self.variables.iter().find(|var| var.binding == binding)
    }
}

fn resource_kind(space: naga::AddressSpace) -> ResourceKind {
    match space {
        naga::AddressSpace::Uniform => ResourceKind::Uniform,
        naga::AddressSpace::Storage { access } => ResourceKind::Storage {
            read_only: !access.contains(naga::StorageAccess::STORE),
        },
        other => ResourceKind::Unsupported(format!("{other:?}")),
    }
}
