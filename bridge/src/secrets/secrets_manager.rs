//! AWS Secrets Manager integration.

use async_trait::async_trait;
use aws_sdk_secretsmanager::types::{Filter, FilterNameStringType};
use aws_sdk_secretsmanager::Client as SecretsClient;
use tracing::debug;

use super::SecretStore;
use crate::{Error, Result};

/// Secret store backed by Secrets Manager. References are secret names or ARNs.
#[derive(Debug, Clone)]
pub struct SecretsManager {
    client: SecretsClient,
}

impl SecretsManager {
    pub fn new(client: SecretsClient) -> Self {
        Self { client }
    }

    /// Get a specific version of a secret, by version id and/or staging label.
    pub async fn get_version(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        version_stage: Option<&str>,
    ) -> Result<Option<String>> {
        debug!(secret_id = %secret_id, ?version_id, ?version_stage, "Fetching secret");

        let response = match self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .set_version_id(version_id.map(String::from))
            .set_version_stage(version_stage.map(String::from))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(Error::Aws(format!("Failed to get secret: {}", e))),
        };

        if let Some(secret_string) = response.secret_string() {
            return Ok(Some(secret_string.to_string()));
        }

        let binary = response
            .secret_binary()
            .ok_or_else(|| Error::Aws("Secret has no string or binary value".to_string()))?;

        String::from_utf8(binary.as_ref().to_vec())
            .map(Some)
            .map_err(|e| Error::Aws(format!("Secret binary is not valid UTF-8: {}", e)))
    }

    /// Create a secret, optionally encrypted with a customer managed KMS key.
    pub async fn create_with_key(
        &self,
        name: &str,
        value: &str,
        kms_key_id: Option<&str>,
    ) -> Result<()> {
        debug!(name = %name, "Creating secret");
        self.client
            .create_secret()
            .name(name)
            .secret_string(value)
            .set_kms_key_id(kms_key_id.map(String::from))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to create secret {}: {}", name, e)))?;
        Ok(())
    }

    /// Update a secret's value, optionally moving it to another KMS key.
    pub async fn update_with_key(
        &self,
        secret_id: &str,
        value: &str,
        kms_key_id: Option<&str>,
    ) -> Result<()> {
        debug!(secret_id = %secret_id, "Updating secret");
        self.client
            .update_secret()
            .secret_id(secret_id)
            .secret_string(value)
            .set_kms_key_id(kms_key_id.map(String::from))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to update secret {}: {}", secret_id, e)))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for SecretsManager {
    async fn get_optional(&self, reference: &str) -> Result<Option<String>> {
        self.get_version(reference, None, None).await
    }

    async fn create(&self, reference: &str, value: &str) -> Result<()> {
        self.create_with_key(reference, value, None).await
    }

    async fn update(&self, reference: &str, value: &str) -> Result<()> {
        self.update_with_key(reference, value, None).await
    }

    /// Adds a new version with the `AWSCURRENT` label.
    async fn upsert(&self, reference: &str, value: &str) -> Result<()> {
        debug!(secret_id = %reference, "Putting secret value");
        self.client
            .put_secret_value()
            .secret_id(reference)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to put secret value {}: {}", reference, e)))?;
        Ok(())
    }

    async fn list_secrets(&self, path: &str) -> Result<Vec<String>> {
        let filter = Filter::builder()
            .key(FilterNameStringType::Name)
            .values(path)
            .build();

        let mut names = Vec::new();
        let mut next_token = None;
        loop {
            let response = self
                .client
                .list_secrets()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| Error::Aws(format!("Failed to list secrets under {}: {}", path, e)))?;

            names.extend(
                response
                    .secret_list()
                    .iter()
                    .filter_map(|entry| entry.name().map(str::to_string)),
            );
            match response.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(names),
            }
        }
    }
}
