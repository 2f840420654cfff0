//! Enqueue Lambda - Forwards direct invocations onto an SQS queue.
//!
//! The invocation payload must be a JSON object; it is sent as the message
//! body to `QUEUE_URL` and echoed back to the caller.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use bridge::backends::{MessageQueue, SqsBackend};
use bridge::{
    Application, Backend, Context, Environment, InputOutput, Model, ParameterStore, Reply,
    Route, TriggerKind,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Enqueue<Q> {
    backend: SqsBackend<Q>,
    model: Model,
}

#[async_trait]
impl<Q: MessageQueue> Application for Enqueue<Q> {
    async fn handle(&self, io: &mut dyn InputOutput) -> anyhow::Result<Reply> {
        let record = match io.json_body()? {
            Some(Value::Object(record)) => record,
            _ => anyhow::bail!("Invocation payload must be a JSON object"),
        };

        let record = self.backend.create(record, &self.model).await?;
        info!(request_id = %io.lambda_context().request_id, "Forwarded invocation to queue");
        Ok(Reply::json(&json!({"queued": true, "message": record}))?)
    }
}

/// Application state
struct AppState {
    context: Context<Enqueue<aws_sdk_sqs::Client>>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let secrets = ParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config));
        let env = Environment::from_process().with_secrets(Arc::new(secrets));

        let app = Enqueue {
            backend: SqsBackend::new(aws_sdk_sqs::Client::new(&sdk_config)),
            model: Model::new(env.get("QUEUE_URL").await?, "id"),
        };

        Ok(Self {
            context: Context::new(TriggerKind::Invocation, app).with_route(Route::new("POST", "/enqueue")),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageQueue for Outbox {
        async fn send_message(&self, queue_url: &str, body: String) -> bridge::Result<()> {
            self.sent.lock().unwrap().push((queue_url.to_string(), body));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwards_payload() {
        let outbox = Arc::new(Outbox::default());
        let app = Enqueue {
            backend: SqsBackend::new(Arc::clone(&outbox)),
            model: Model::new("https://sqs.eu-west-1.amazonaws.com/1/jobs", "id"),
        };
        let context = Context::new(TriggerKind::Invocation, app);

        let response = context
            .handle(LambdaEvent::new(json!({"job": "reindex"}), lambda_runtime::Context::default()))
            .await
            .unwrap();
        assert_eq!(response, json!({"queued": true, "message": {"job": "reindex"}}));

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent[0].0, "https://sqs.eu-west-1.amazonaws.com/1/jobs");
        assert_eq!(sent[0].1, r#"{"job":"reindex"}"#);
    }

    #[tokio::test]
    async fn test_rejects_non_object_payload() {
        let app = Enqueue {
            backend: SqsBackend::new(Outbox::default()),
            model: Model::new("queue", "id"),
        };
        let context = Context::new(TriggerKind::Invocation, app);
        let err = context
            .handle(LambdaEvent::new(json!("just a string"), lambda_runtime::Context::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, bridge::Error::Handler(_)));
    }
}
