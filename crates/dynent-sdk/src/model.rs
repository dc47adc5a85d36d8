//! Type and document-schema definitions loaded from a file.

use std::path::Path;

use dynent_document::DocSchema;
use dynent_schema::SchemaDescriptor;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// A set of entity types and the document schemas backing them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub types: Vec<SchemaDescriptor>,
    #[serde(default)]
    pub schemas: Vec<DocSchema>,
}

impl Model {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Model(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> SdkResult<Self> {
        serde_json::from_str(text).map_err(|e| SdkError::Model(e.to_string()))
    }

    /// Read a `.json` file as JSON and anything else as TOML.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }
}
