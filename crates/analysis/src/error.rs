//! Error types for shader preprocessing, reflection and analysis

/// Errors raised while building, reflecting or merging shader modules
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// WGSL source could not be parsed (shader name, rendered diagnostic)
    #[error("failed to parse shader '{shader}':\n{message}")]
    Parse { shader: String, message: String },

    /// WGSL source parsed but failed validation (shader name, rendered diagnostic)
    #[error("shader '{shader}' failed validation:\n{message}")]
    Validation { shader: String, message: String },

    /// A `{{name}}` placeholder had no value in the interpolation dictionary
    #[error("shader '{shader}' has no interpolation value for placeholder '{{{{{name}}}}}'")]
    UnresolvedPlaceholder { shader: String, name: String },

    /// A bound variable is neither a uniform nor a storage buffer
    #[error("variable '{name}' at binding {binding} has unsupported resource kind '{kind}'")]
    UnsupportedResourceKind { name: String, binding: u32, kind: String },

    /// The simulation manifest is structurally invalid
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// The simulation manifest could not be deserialized
    #[error("failed to read manifest: {0}")]
    ManifestSyntax(#[from] serde_norway::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
