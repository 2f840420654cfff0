//! AWS Systems Manager Parameter Store integration.

use async_trait::async_trait;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client as SsmClient;
use tracing::debug;

use super::SecretStore;
use crate::{Error, Result};

/// Secret store backed by SSM parameters. References are parameter paths.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    client: SsmClient,
}

impl ParameterStore {
    pub fn new(client: SsmClient) -> Self {
        Self { client }
    }

    async fn put(&self, reference: &str, value: &str) -> Result<()> {
        debug!(path = %reference, "Writing parameter");
        self.client
            .put_parameter()
            .name(reference)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to put parameter {}: {}", reference, e)))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for ParameterStore {
    async fn get_optional(&self, reference: &str) -> Result<Option<String>> {
        debug!(path = %reference, "Fetching parameter");

        let response = match self
            .client
            .get_parameter()
            .name(reference)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|e| e.is_parameter_not_found()) => {
                return Ok(None);
            }
            Err(e) => return Err(Error::Aws(format!("Failed to get parameter: {}", e))),
        };

        let value = response
            .parameter()
            .and_then(|p| p.value())
            .ok_or_else(|| Error::Aws(format!("Parameter '{}' has no value", reference)))?;

        Ok(Some(value.to_string()))
    }

    // Parameter writes always overwrite, so all three are the same call.
    async fn create(&self, reference: &str, value: &str) -> Result<()> {
        self.put(reference, value).await
    }

    async fn update(&self, reference: &str, value: &str) -> Result<()> {
        self.put(reference, value).await
    }

    async fn upsert(&self, reference: &str, value: &str) -> Result<()> {
        self.put(reference, value).await
    }

    async fn list_secrets(&self, path: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token = None;
        loop {
            let response = self
                .client
                .get_parameters_by_path()
                .path(path)
                .recursive(false)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| Error::Aws(format!("Failed to list parameters under {}: {}", path, e)))?;

            names.extend(
                response
                    .parameters()
                    .iter()
                    .filter_map(|p| p.name().map(str::to_string)),
            );
            match response.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(names),
            }
        }
    }
}
