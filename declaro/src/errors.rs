use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned while compiling declarations.
///
/// Every variant is raised synchronously at registration or first compile and is
/// never retried: it always points at a defect in a declaration.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A declaration is structurally invalid regardless of any data instance.
    #[error("invalid configuration: {message}")]
    Configuration { message: Cow<'static, str> },

    /// A declared reference could not be resolved against its target type.
    #[error("invalid mapping: {message}")]
    Mapping {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<MetadataError>>,
    },

    /// A construct matched none of the resolution rules.
    #[error("unsupported operation: {message}")]
    Unsupported { message: Cow<'static, str> },

    /// Internal consistency failure while reading a declaration or instance.
    #[error("invalid state: {message}")]
    State {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<MetadataError>>,
    },

    /// A type was handed to an operation that does not accept it.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: Cow<'static, str> },

    /// A manifest file could not be parsed.
    #[error("failed to parse manifest: {0}")]
    Manifest(#[from] toml::de::Error),

    /// A descriptor instance could not be converted to its JSON form.
    #[error("failed to serialize descriptor instance: {0}")]
    Instance(#[from] serde_json::Error),

    /// Reading a manifest from disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn mapping(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Mapping {
            message: message.into(),
            source: None,
        }
    }

    /// Mapping error that keeps the failure which triggered it.
    pub fn mapping_caused_by(message: impl Into<Cow<'static, str>>, cause: MetadataError) -> Self {
        Self::Mapping {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::State {
            message: message.into(),
            source: None,
        }
    }

    pub fn state_caused_by(message: impl Into<Cow<'static, str>>, cause: MetadataError) -> Self {
        Self::State {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }
}

/// Convenience alias for results produced by the compiler.
pub type MetadataResult<T> = Result<T, MetadataError>;
