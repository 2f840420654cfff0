//! Configuration management for Lambda functions.

use crate::context::TriggerKind;
use crate::{Environment, Error, Result};

/// Default MySQL port used for IAM database authentication.
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Application configuration, loaded once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Trigger this function is deployed behind
    pub trigger: TriggerKind,
    /// Database endpoint hostname
    pub db_endpoint: Option<String>,
    /// Database port
    pub db_port: u16,
    /// Database user for IAM authentication
    pub db_username: Option<String>,
    /// Database (schema) name
    pub db_database: Option<String>,
    /// Path to the RDS CA bundle used to verify the database certificate
    pub ssl_ca_bundle_filename: Option<String>,
}

impl Config {
    /// Load configuration from the environment snapshot.
    ///
    /// `secret://` values are resolved through the environment's secret store.
    pub async fn load(env: &Environment) -> Result<Self> {
        let trigger = match env.get_optional("LAMBDA_TRIGGER").await? {
            Some(value) => value.parse()?,
            None => TriggerKind::RestApi,
        };

        let db_port = match env.get_optional("DB_PORT").await? {
            Some(value) => value
                .parse()
                .map_err(|e| Error::Config(format!("Invalid DB_PORT '{}': {}", value, e)))?,
            None => DEFAULT_DB_PORT,
        };

        Ok(Self {
            aws_region: env.get("AWS_REGION").await?,
            trigger,
            db_endpoint: env.get_optional("DB_ENDPOINT").await?,
            db_port,
            db_username: env.get_optional("DB_USERNAME").await?,
            db_database: env.get_optional("DB_DATABASE").await?,
            ssl_ca_bundle_filename: env.get_optional("SSL_CA_BUNDLE_FILENAME").await?,
        })
    }
}
