//! Process environment snapshot with secret reference resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::secrets::SecretStore;
use crate::{Error, Result};

/// Values with this prefix are fetched from the bound secret store.
pub const SECRET_PREFIX: &str = "secret://";

/// Environment values captured once at start-up.
///
/// Lookups never touch `std::env` after construction. Values written as
/// `secret://<reference>` resolve through the injected [`SecretStore`], which
/// sees `<reference>` exactly as written.
#[derive(Clone, Default)]
pub struct Environment {
    values: HashMap<String, String>,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("has_secret_store", &self.secrets.is_some())
            .finish()
    }
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_map(std::env::vars().collect())
    }

    /// Build from an explicit set of values.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            values,
            secrets: None,
        }
    }

    /// Bind the secret store used for `secret://` references.
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// The literal value as captured, without resolving secret references.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get a required value, resolving secret references.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.get_optional(key).await?.ok_or_else(|| {
            Error::Config(format!(
                "Could not find environment value '{}'",
                key
            ))
        })
    }

    /// Get a value if present, resolving secret references.
    pub async fn get_optional(&self, key: &str) -> Result<Option<String>> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };

        let Some(reference) = value.strip_prefix(SECRET_PREFIX) else {
            return Ok(Some(value.clone()));
        };

        let secrets = self.secrets.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "Environment value '{}' references a secret but no secret store is configured",
                key
            ))
        })?;

        debug!(key = %key, "Resolving secret reference");
        secrets.get(reference).await.map(Some)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory secret store that records every lookup.
    #[derive(Default)]
    pub(crate) struct FakeSecrets {
        pub values: HashMap<String, String>,
        pub lookups: Mutex<Vec<String>>,
    }

    impl FakeSecrets {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                lookups: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SecretStore for FakeSecrets {
        async fn get_optional(&self, reference: &str) -> Result<Option<String>> {
            self.lookups.lock().unwrap().push(reference.to_string());
            Ok(self.values.get(reference).cloned())
        }
    }

    fn env(pairs: &[(&str, &str)]) -> Environment {
        Environment::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_literal_values_pass_through() {
        let env = env(&[("AWS_REGION", "us-east-2")]);
        assert_eq!(env.get("AWS_REGION").await.unwrap(), "us-east-2");
        assert_eq!(env.get_optional("DB_ENDPOINT").await.unwrap(), None);
        assert!(matches!(env.get("DB_ENDPOINT").await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_secret_reference_is_passed_unmodified() {
        let store = Arc::new(FakeSecrets::with(&[("/prod/db/password", "hunter2")]));
        let env = env(&[("DB_PASSWORD", "secret:///prod/db/password")]).with_secrets(store.clone());

        assert_eq!(env.get("DB_PASSWORD").await.unwrap(), "hunter2");
        assert_eq!(env.raw("DB_PASSWORD"), Some("secret:///prod/db/password"));
        assert_eq!(*store.lookups.lock().unwrap(), vec!["/prod/db/password"]);
    }

    #[tokio::test]
    async fn test_each_lookup_hits_the_store() {
        let store = Arc::new(FakeSecrets::with(&[("token", "abc")]));
        let env = env(&[("API_TOKEN", "secret://token")]).with_secrets(store.clone());

        env.get("API_TOKEN").await.unwrap();
        env.get("API_TOKEN").await.unwrap();
        assert_eq!(store.lookups.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let store = Arc::new(FakeSecrets::default());
        let env = env(&[("API_TOKEN", "secret://missing")]).with_secrets(store);
        assert!(matches!(env.get("API_TOKEN").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_secret_without_store_is_config_error() {
        let env = env(&[("API_TOKEN", "secret://token")]);
        assert!(matches!(env.get("API_TOKEN").await, Err(Error::Config(_))));
    }
}
