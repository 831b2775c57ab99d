//! Error types for the EDMX object model

use thiserror::Error;

use crate::model::{ObjectKind, Section};

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// EDMX model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Name collision: a {kind} named '{name}' already exists")]
    NameCollision { kind: ObjectKind, name: String },

    #[error("Invalid name for {kind}: '{name}'")]
    InvalidName { kind: ObjectKind, name: String },

    #[error("Invalid association between '{from}' and '{to}': {reason}")]
    InvalidAssociation {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid model object: {kind} '{name}': {reason}")]
    InvalidModelObject {
        kind: ObjectKind,
        name: String,
        reason: String,
    },

    #[error("Invalid schema namespace: '{0}'")]
    InvalidNamespace(String),

    #[error("{kind} '{name}' belongs to the {found} section, expected {expected}")]
    WrongSection {
        kind: ObjectKind,
        name: String,
        expected: Section,
        found: Section,
    },

    #[error("{kind} has been removed from the model")]
    Detached { kind: ObjectKind },

    #[error("Inheritance cycle detected at entity type '{name}'")]
    InheritanceCycle { name: String },

    #[error("Document is missing the {0} section")]
    MissingSection(&'static str),

    #[error("Unsupported EDMX version: {0}")]
    UnsupportedVersion(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ModelError {
    /// Kind and name of the object the error is about, when it names one
    pub fn subject(&self) -> Option<(ObjectKind, &str)> {
        match self {
            Self::NameCollision { kind, name }
            | Self::InvalidName { kind, name }
            | Self::InvalidModelObject { kind, name, .. }
            | Self::WrongSection { kind, name, .. } => Some((*kind, name.as_str())),
            Self::InheritanceCycle { name } => Some((ObjectKind::EntityType, name.as_str())),
            _ => None,
        }
    }
}

/// Wrap any XML reader/writer failure
pub(crate) fn xml_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::Xml(e.to_string())
}
