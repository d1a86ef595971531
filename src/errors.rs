//! Error types for the generation pipeline.
//!
//! Each pipeline stage owns its error type. Validation, allocation, and
//! resolution problems are collected into complete lists before the run
//! aborts, so one pass over the document surfaces every violation.

use std::path::PathBuf;

use thiserror::Error;

/// A document fragment could not be read, parsed, or merged.
#[derive(Debug, Error)]
#[error("{path}: {reason}", path = .file.display())]
pub struct LoadError {
    pub file: PathBuf,
    pub reason: String,
}

impl LoadError {
    pub fn new(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// A single violated document constraint, addressed by the field that
/// declares it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A CIDR or address collision found while assigning zones and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AllocationError(pub String);

/// The declared resource capacity cannot satisfy the explicit overrides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ResourcePolicyError(pub String);

/// An unknown reference, mount-path collision, or volume-name collision
/// found while expanding cross-cutting declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ResolutionError(pub String);

/// A file could not be rendered or written.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{path}: managed region markers are malformed: {reason}", path = .file.display())]
    MalformedMarkers { file: PathBuf, reason: String },

    #[error("{path}: {source}", path = .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing payload: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Umbrella error for a whole `generate` run. Stages that collect report
/// every problem they found, not just the first.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("address allocation failed with {} error(s)", .0.len())]
    Allocation(Vec<AllocationError>),

    #[error("resource policy failed: {0}")]
    ResourcePolicy(#[from] ResourcePolicyError),

    #[error("resolution failed with {} error(s)", .0.len())]
    Resolution(Vec<ResolutionError>),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),
}

impl GenerateError {
    /// Every individual problem in this failure, one line each, for the
    /// caller to print to the error stream.
    pub fn details(&self) -> Vec<String> {
        match self {
            GenerateError::Load(e) => vec![e.to_string()],
            GenerateError::Validation(list) => list.iter().map(|e| e.to_string()).collect(),
            GenerateError::Allocation(list) => list.iter().map(|e| e.to_string()).collect(),
            GenerateError::ResourcePolicy(e) => vec![e.to_string()],
            GenerateError::Resolution(list) => list.iter().map(|e| e.to_string()).collect(),
            GenerateError::Render(e) => vec![e.to_string()],
        }
    }
}
