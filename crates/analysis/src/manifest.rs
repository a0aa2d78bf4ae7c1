//! Simulation manifest parser
//!
//! A manifest names the shader files of one simulation, an optional shared
//! prelude, and the interpolation dictionary applied to every shader.

use crate::{AnalysisError, BindingTable, InterpolationValue, ShaderModule, ShaderModuleBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

/// Default compute workgroup edge length
pub const DEFAULT_WORKGROUP_SIZE: u32 = 8;

fn default_workgroup_size() -> u32 {
    DEFAULT_WORKGROUP_SIZE
}

/// One shader entry of a manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ShaderEntry {
    /// Key of the shader in the built shader set
    pub name: String,
    /// Shader file path relative to the manifest
    pub file: String,
}

/// Raw simulation manifest as parsed from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationManifest {
    /// Unique simulation identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Optional prelude file prepended to every shader
    #[serde(default)]
    pub utils: Option<String>,
    /// Compute workgroup edge length (defaults to 8)
    #[serde(default = "default_workgroup_size")]
    pub workgroup_size: u32,
    /// Placeholder values substituted into every shader
    #[serde(default)]
    pub interpolations: BTreeMap<String, InterpolationValue>,
    /// Shaders sharing one bind group layout
    pub shaders: Vec<ShaderEntry>,
}

impl SimulationManifest {
    /// Parses a manifest from YAML content
    pub fn from_yaml(yaml_content: &str) -> Result<Self, AnalysisError> {
        Ok(serde_norway::from_str(yaml_content)?)
    }

    /// Parses a manifest from a YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Checks the manifest for structural errors
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.id.is_empty() {
            return Err(AnalysisError::Manifest("simulation id cannot be empty".into()));
        }
        if self.name.is_empty() {
            return Err(AnalysisError::Manifest("simulation name cannot be empty".into()));
        }
        if self.shaders.is_empty() {
            return Err(AnalysisError::Manifest("at least one shader is required".into()));
        }
        if self.workgroup_size == 0 {
            return Err(AnalysisError::Manifest("workgroup size must be positive".into()));
        }

        let mut names = HashSet::new();
        for shader in &self.shaders {
            if !names.insert(shader.name.as_str()) {
                return Err(AnalysisError::Manifest(format!("duplicate shader name '{}'", shader.name)));
            }
        }

        Ok(())
    }

    /// Loads, preprocesses and reflects every shader of the manifest
    ///
    /// # Arguments
    /// * `load_shader_file` - Function to load shader source files by manifest-relative path
    ///
    /// # Returns
    /// The named shader modules in ascending name order
    pub fn build_shaders(&self, load_shader_file: impl Fn(&str) -> Result<String, std::io::Error>) -> Result<BTreeMap<String, ShaderModule>, AnalysisError> {
        self.validate()?;

        let utils = match &self.utils {
            Some(file) => load_shader_file(file)?,
            None => String::new(),
        };
        let builder = ShaderModuleBuilder::new(utils, self.interpolations.clone());

        self.shaders
            .iter()
            .map(|entry| -> Result<(String, ShaderModule), AnalysisError> {
                let source = load_shader_file(&entry.file)?;
                Ok((entry.name.clone(), builder.build(&entry.name, &source)?))
            })
            .collect()
    }

    /// Builds the shaders and merges their binding metadata
    pub fn analyze(&self, load_shader_file: impl Fn(&str) -> Result<String, std::io::Error>) -> Result<BindingTable, AnalysisError> {
        let shaders = self.build_shaders(load_shader_file)?;
        BindingTable::analyze(shaders.iter().map(|(name, module)| (name.as_str(), module)))
    }
}
