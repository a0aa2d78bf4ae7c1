//! Shader modules and their preprocessing
//!
//! A [`ShaderModule`] owns final WGSL source together with its reflected symbol
//! table. Modules are produced by a [`ShaderModuleBuilder`], which prepends a
//! shared utility prelude and substitutes `{{name}}` placeholders before reflection.

use crate::{AnalysisError, ShaderReflection, Stage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// A value substituted into shader source for a `{{name}}` placeholder
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InterpolationValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for InterpolationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for InterpolationValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for InterpolationValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for InterpolationValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for InterpolationValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for InterpolationValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Builds shader modules from template sources sharing one prelude and one dictionary
#[derive(Debug, Clone, Default)]
pub struct ShaderModuleBuilder {
    /// Source prepended to every shader
    utils: String,
    /// Placeholder values
    interpolations: BTreeMap<String, InterpolationValue>,
}

impl ShaderModuleBuilder {
    /// Creates a builder with a shared prelude and interpolation dictionary
    pub fn new(utils: impl Into<String>, interpolations: BTreeMap<String, InterpolationValue>) -> Self {
        Self {
            utils: utils.into(),
            interpolations,
        }
    }

    /// Adds or replaces one interpolation value
    pub fn interpolation(mut self, name: impl Into<String>, value: impl Into<InterpolationValue>) -> Self {
        self.interpolations.insert(name.into(), value.into());
        self
    }

    /// Preprocesses and reflects one shader
    ///
    /// # Arguments
    /// * `name` - Name of the shader, used in diagnostics and as its key in a shader set
    /// * `source` - Template WGSL source
    ///
    /// # Returns
    /// The immutable shader module, or an error if a placeholder is unresolved or reflection fails
    pub fn build(&self, name: &str, source: &str) -> Result<ShaderModule, AnalysisError> {
        let template = if self.utils.is_empty() { source.to_string() } else { format!("{}\n{}", self.utils, source) };
        let code = self.interpolate(name, &template)?;
        ShaderModule::new(name, code)
    }

    fn interpolate(&self, shader: &str, template: &str) -> Result<String, AnalysisError> {
        let mut output = String::with_capacity(template.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let value = self.interpolations.get(key.as_str()).ok_or_else(|| AnalysisError::UnresolvedPlaceholder {
                shader: shader.to_string(),
                name: key.as_str().to_string(),
            })?;
            output.push_str(&template[last..whole.start()]);
            output.push_str(&value.to_string());
            last = whole.end();
        }
        output.push_str(&template[last..]);
        Ok(output)
    }
}

/// Final shader source plus its reflected metadata; immutable once built
#[derive(Debug, Clone)]
pub struct ShaderModule {
    name: String,
    code: String,
    reflection: ShaderReflection,
}

impl ShaderModule {
    /// Reflects already-preprocessed WGSL source
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Result<Self, AnalysisError> {
        let name = name.into();
        let code = code.into();
        let reflection = ShaderReflection::from_wgsl(&name, &code)?;
        tracing::debug!(
            shader = %name,
            entry_points = reflection.entry_points.len(),
            variables = reflection.variables.len(),
            "reflected shader module"
        );
        Ok(Self { name, code, reflection })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final WGSL source with the prelude and substitutions applied
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Names of the entry points this module declares for `stage`
    pub fn entry_points(&self, stage: Stage) -> impl Iterator<Item = &str> {
        self.reflection.entry_points_for(stage).map(|ep| ep.name.as_str())
    }
}
