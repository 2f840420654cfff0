//! Secret store lookups.
//!
//! Both stores resolve a reference to its current value with a fresh remote
//! call every time; there is no caching or rotation handling here. Writes go
//! straight through as well.

mod parameter_store;
mod secrets_manager;

use async_trait::async_trait;

use crate::{Error, Result};

pub use parameter_store::ParameterStore;
pub use secrets_manager::SecretsManager;

/// A store that resolves a secret reference (path or ARN) to its value.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret, returning `None` when the store has no such entry.
    async fn get_optional(&self, reference: &str) -> Result<Option<String>>;

    /// Fetch the secret, failing with [`Error::NotFound`] when it does not exist.
    async fn get(&self, reference: &str) -> Result<String> {
        self.get_optional(reference)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Could not find secret '{}'", reference)))
    }

    /// Store a new secret.
    async fn create(&self, reference: &str, _value: &str) -> Result<()> {
        Err(unsupported("create", reference))
    }

    /// Replace the value of an existing secret.
    async fn update(&self, reference: &str, _value: &str) -> Result<()> {
        Err(unsupported("update", reference))
    }

    /// Write a value whether or not the secret exists yet.
    async fn upsert(&self, reference: &str, _value: &str) -> Result<()> {
        Err(unsupported("upsert", reference))
    }

    /// Names of the secrets directly under `path`.
    async fn list_secrets(&self, path: &str) -> Result<Vec<String>> {
        Err(unsupported("list", path))
    }
}

fn unsupported(operation: &str, reference: &str) -> Error {
    Error::Unsupported(format!(
        "This secret store cannot {} '{}'",
        operation, reference
    ))
}
