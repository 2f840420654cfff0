//! Database Health Lambda - Verifies IAM-authenticated access to MySQL.
//!
//! This Lambda runs on a schedule via EventBridge and:
//! 1. Generates a fresh IAM auth token
//! 2. Opens a TLS connection pool to the database
//! 3. Runs `SELECT 1` and reports the round-trip time
//!
//! Failures are returned as errors so the invocation shows up in alarms.

use anyhow::Context as _;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use bridge::{
    db, Application, Config, Context, Environment, IamDbAuth, InputOutput, ParameterStore, Reply,
    TriggerKind,
};
use chrono::Utc;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    host: String,
    database: String,
    latency_ms: u128,
    checked_at: String,
}

struct DbHealth {
    auth: IamDbAuth,
    sdk_config: SdkConfig,
}

impl DbHealth {
    fn from_config(config: &Config, sdk_config: SdkConfig) -> bridge::Result<Self> {
        Ok(Self {
            auth: IamDbAuth::from_config(config)?,
            sdk_config,
        })
    }
}

#[async_trait]
impl Application for DbHealth {
    async fn handle(&self, _io: &mut dyn InputOutput) -> anyhow::Result<Reply> {
        let started = Instant::now();
        let details = self
            .auth
            .connection_details(&self.sdk_config)
            .await
            .context("Failed to build connection details")?;

        let pool = db::create_pool(&details)
            .await
            .with_context(|| format!("Failed to connect to {}", details.host))?;
        let checked = db::ping(&pool).await;
        pool.close().await;
        checked.context("Health query failed")?;

        let report = HealthReport {
            status: "ok",
            host: details.host,
            database: details.database,
            latency_ms: started.elapsed().as_millis(),
            checked_at: Utc::now().to_rfc3339(),
        };
        info!(host = %report.host, latency_ms = report.latency_ms, "Database reachable");
        Ok(Reply::json(&report)?)
    }
}

/// Application state
struct AppState {
    context: Context<DbHealth>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let secrets = ParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config));
        let env = Environment::from_process().with_secrets(Arc::new(secrets));
        let config = Config::load(&env).await?;

        let app = DbHealth::from_config(&config, sdk_config)?;
        Ok(Self {
            context: Context::new(TriggerKind::Invocation, app),
        })
    }
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    Ok(state.context.handle(event).await?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
