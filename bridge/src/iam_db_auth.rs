//! IAM authentication tokens for RDS/Aurora MySQL.
//!
//! A token is a SigV4 presigned `connect` URL for the `rds-db` service with the
//! scheme removed. It is valid for 15 minutes and is used as the password.

use std::fmt;
use std::time::{Duration, SystemTime};

use aws_config::SdkConfig;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SignatureLocation, SigningSettings,
};
use aws_sigv4::sign::v4;
use tracing::debug;

use crate::{Config, Error, Result};

const SIGNING_NAME: &str = "rds-db";
const TOKEN_LIFETIME: Duration = Duration::from_secs(900);

/// Everything needed to open an IAM-authenticated MySQL connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub username: String,
    /// Authentication token
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub ssl_ca: Option<String>,
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("ssl_ca", &self.ssl_ca)
            .finish()
    }
}

/// Token generator for one database user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamDbAuth {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub database: String,
    pub region: String,
    pub ssl_ca_bundle: Option<String>,
}

impl IamDbAuth {
    /// Build from configuration. Endpoint, username and database are required.
    pub fn from_config(config: &Config) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| Error::Config(format!("{} is required for IAM database auth", name)))
        };

        Ok(Self {
            hostname: required(&config.db_endpoint, "DB_ENDPOINT")?,
            port: config.db_port,
            username: required(&config.db_username, "DB_USERNAME")?,
            database: required(&config.db_database, "DB_DATABASE")?,
            region: config.aws_region.clone(),
            ssl_ca_bundle: config.ssl_ca_bundle_filename.clone(),
        })
    }

    /// Presign a connect request with the given credentials at `time`.
    pub fn generate_token(&self, credentials: &Credentials, time: SystemTime) -> Result<String> {
        let identity = credentials.clone().into();

        let mut settings = SigningSettings::default();
        settings.expires_in = Some(TOKEN_LIFETIME);
        settings.signature_location = SignatureLocation::QueryParams;

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(time)
            .settings(settings)
            .build()
            .map_err(|e| Error::Signing(format!("Invalid signing parameters: {}", e)))?;

        let endpoint = format!(
            "https://{}:{}/?Action=connect&DBUser={}",
            self.hostname,
            self.port,
            urlencoding::encode(&self.username)
        );
        let request = SignableRequest::new("GET", &endpoint, std::iter::empty(), SignableBody::Bytes(&[]))
            .map_err(|e| Error::Signing(format!("Failed to build signable request: {}", e)))?;
        let (instructions, _signature) = sign(request, &params.into())
            .map_err(|e| Error::Signing(format!("Failed to sign request: {}", e)))?
            .into_parts();

        let mut token = endpoint
            .strip_prefix("https://")
            .unwrap_or(&endpoint)
            .to_string();
        for (name, value) in instructions.params() {
            token.push('&');
            token.push_str(name);
            token.push('=');
            token.push_str(&urlencoding::encode(&value));
        }

        Ok(token)
    }

    /// Resolve fresh credentials and generate a token for them.
    pub async fn connection_details(&self, sdk_config: &SdkConfig) -> Result<ConnectionDetails> {
        let provider = sdk_config
            .credentials_provider()
            .ok_or_else(|| Error::Config("No AWS credentials provider configured".to_string()))?;
        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| Error::Aws(format!("Failed to resolve credentials: {}", e)))?;

        let token = self.generate_token(&credentials, SystemTime::now())?;
        debug!(host = %self.hostname, user = %self.username, "Generated IAM auth token");

        Ok(ConnectionDetails {
            username: self.username.clone(),
            password: token,
            host: self.hostname.clone(),
            port: self.port,
            database: self.database.clone(),
            ssl_ca: self.ssl_ca_bundle.clone(),
        })
    }
}
