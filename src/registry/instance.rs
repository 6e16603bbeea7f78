use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::KEY_SEPARATOR;
use crate::RegistryError;

/// One running, addressable process of a named service
///
/// Stored as JSON under `<prefix_path>/<name>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique within `name`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// URI-like addresses, e.g. `grpc://10.0.0.1:9000`
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    /// Creates an instance of `name` with a freshly generated id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: nanoid::nanoid!(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_version(
        mut self,
        version: impl Into<String>,
    ) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_endpoint(
        mut self,
        endpoint: impl Into<String>,
    ) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks that the instance maps onto exactly one storage key
    pub(crate) fn validate(&self) -> std::result::Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::InvalidInstance("service name cannot be empty".into()));
        }
        if self.id.is_empty() {
            return Err(RegistryError::InvalidInstance(format!(
                "instance id cannot be empty for service {}",
                self.name
            )));
        }
        if self.name.contains(KEY_SEPARATOR) || self.id.contains(KEY_SEPARATOR) {
            return Err(RegistryError::InvalidInstance(format!(
                "service name and id must not contain '{}': {}/{}",
                KEY_SEPARATOR, self.name, self.id
            )));
        }
        Ok(())
    }
}
