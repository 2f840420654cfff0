//! Queue Consumer Lambda - Stores SQS messages in DynamoDB.
//!
//! This Lambda is triggered by SQS with partial batch responses enabled and:
//! 1. Parses each message body as a JSON object
//! 2. Stamps it with `received_at`
//! 3. Writes it to the records table
//!
//! Messages that fail are reported back to SQS individually and retried.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use bridge::backends::DynamoDbBackend;
use bridge::{
    Application, Backend, Context, Environment, InputOutput, Model, ParameterStore, Reply,
    TriggerKind,
};
use chrono::Utc;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Archiver<B> {
    backend: B,
    model: Model,
}

#[async_trait]
impl<B: Backend> Application for Archiver<B> {
    async fn handle(&self, io: &mut dyn InputOutput) -> anyhow::Result<Reply> {
        let mut record = match io.json_body()? {
            Some(Value::Object(record)) => record,
            other => anyhow::bail!("Expected a JSON object, got {:?}", other),
        };
        if !record.contains_key(&self.model.id_column) {
            anyhow::bail!("Message has no '{}' attribute", self.model.id_column);
        }
        record.insert("received_at".to_string(), Value::String(Utc::now().to_rfc3339()));

        let record = self.backend.create(record, &self.model).await?;
        info!(id = %record[&self.model.id_column], "Stored queued record");
        Ok(Reply::new(Value::Null))
    }
}

/// Application state
struct AppState {
    context: Context<Archiver<DynamoDbBackend>>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let secrets = ParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config));
        let env = Environment::from_process().with_secrets(Arc::new(secrets));

        let model = Model::new(
            env.get("RECORDS_TABLE").await?,
            env.get_optional("RECORDS_ID_COLUMN")
                .await?
                .unwrap_or_else(|| "id".to_string()),
        );
        let backend = DynamoDbBackend::new(aws_sdk_dynamodb::Client::new(&sdk_config));

        Ok(Self {
            context: Context::new(TriggerKind::SqsBatch, Archiver { backend, model }),
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
