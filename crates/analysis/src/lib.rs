//! Shader analysis for the terrasketch GPU engine
//!
//! This crate turns WGSL template sources into reflected shader modules and
//! merges their buffer bindings into one table describing a shared bind group
//! layout. It has no dependency on a graphics device, so everything here can be
//! exercised in plain unit tests and from the `analyze` command-line tool.

mod analyzer;
mod error;
mod manifest;
mod reflection;
mod shader_module;
mod stage;

pub use analyzer::{BindingTable, BindingUsage, VariableDescriptor};
pub use error::AnalysisError;
pub use manifest::{DEFAULT_WORKGROUP_SIZE, ShaderEntry, SimulationManifest};
pub use reflection::{EntryPointInfo, ResourceKind, ShaderReflection, VariableInfo};
pub use shader_module::{InterpolationValue, ShaderModule, ShaderModuleBuilder};
pub use stage::{Stage, StageSet};
