//! Role model: definitions, capabilities, restrictions, and the registry that
//! loads them.

pub mod builtin;
pub mod definition;
pub mod llm;
pub mod manager;
pub mod restriction;
pub mod store;
pub mod tool_group;
pub mod validator;
pub mod value;

pub use definition::{RoleDefinition, parse_role_document, validate_role_name};
pub use manager::{LoadReport, RoleLoadError, RoleManager};
pub use restriction::{RestrictionType, Restrictions};
pub use tool_group::{ToolGroup, ToolGroupEntry};
pub use validator::{RoleValidator, ValidationReport};
pub use value::ScalarValue;

use thiserror::Error;

/// Errors raised while turning YAML into role definitions.
#[derive(Debug, Error)]
pub enum RoleParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown tool group '{0}'")]
    UnknownToolGroup(String),

    #[error("unknown restriction type '{0}'")]
    UnknownRestriction(String),

    #[error("invalid option '{option}' in tool group '{entry}' (expected key=value)")]
    InvalidOption { entry: String, option: String },

    #[error("invalid restriction entry '{0}' (expected 'type: value')")]
    InvalidRestrictionEntry(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid role name '{0}': only letters, digits, '_' and '-' are allowed")]
    InvalidName(String),

    #[error("unsupported role document: {0}")]
    UnsupportedShape(String),

    #[error("role '{role}': {source}")]
    InRole {
        role: String,
        #[source]
        source: Box<RoleParseError>,
    },
}

impl RoleParseError {
    /// Attach the name of the role being parsed.
    pub fn in_role(self, role: &str) -> Self {
        match self {
            already @ RoleParseError::InRole { .. } => already,
            other => RoleParseError::InRole {
                role: role.to_string(),
                source: Box::new(other),
            },
        }
    }
}
