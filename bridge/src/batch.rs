//! SQS partial batch processing.
//!
//! Each record is handed to the application on its own, in delivery order.
//! A record that fails is reported back in `batchItemFailures` so that only
//! that message is redelivered; the rest of the batch carries on.

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::context::{Application, Route};
use crate::io::sqs::{SqsEvent, SqsRecord};
use crate::io::InputOutput;
use crate::{Error, Result};

/// Partial batch failure response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

impl BatchResponse {
    pub fn fail(&mut self, message_id: impl Into<String>) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: message_id.into(),
        });
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
    }
}

/// Run the application once per record of an SQS batch event.
pub async fn process<A: Application + ?Sized>(
    application: &A,
    event: Value,
    context: lambda_runtime::Context,
    route: &Route,
) -> Result<BatchResponse> {
    let event: SqsEvent = serde_json::from_value(event)
        .map_err(|e| Error::InvalidEvent(format!("Failed to parse event from SQS: {}", e)))?;

    let total = event.records.len();
    let mut response = BatchResponse::default();

    for message in event.records {
        let message_id = message.message_id.clone();

        let mut record = match SqsRecord::new(message, context.clone(), route) {
            Ok(record) => record,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Rejecting SQS message");
                response.fail(message_id);
                continue;
            }
        };

        let outcome = match application.handle(&mut record).await {
            Ok(reply) => record.respond(reply).map(|_| ()),
            Err(e) => Err(Error::Handler(e)),
        };

        if let Err(e) = outcome {
            error!(message_id = %message_id, error = %e, "Failed to process SQS message");
            response.fail(message_id);
        }
    }

    info!(
        records = total,
        failed = response.batch_item_failures.len(),
        "Processed SQS batch"
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Reply;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every payload it sees and fails on payloads containing "boom".
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Application for Recorder {
        async fn handle(&self, io: &mut dyn InputOutput) -> anyhow::Result<Reply> {
            let payload = io.json_body()?.unwrap_or(Value::Null);
            self.seen.lock().unwrap().push(payload.clone());
            if payload.get("boom").is_some() {
                anyhow::bail!("oops");
            }
            Ok(Reply::new(Value::Null))
        }
    }

    fn batch(bodies: &[(&str, &str)]) -> Value {
        json!({
            "Records": bodies
                .iter()
                .map(|(id, body)| json!({"messageId": id, "body": body, "eventSource": "aws:sqs"}))
                .collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_all_records_succeed() {
        let app = Recorder::default();
        let event = batch(&[("1-2-3-4", r#"{"hey": "sup"}"#), ("2-3-4-5", r#"{"cool": "yo"}"#)]);

        let response = process(&app, event, Default::default(), &Route::default())
            .await
            .unwrap();

        assert!(response.batch_item_failures.is_empty());
        assert_eq!(
            *app.seen.lock().unwrap(),
            vec![json!({"hey": "sup"}), json!({"cool": "yo"})]
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"batchItemFailures": []})
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let app = Recorder::default();
        let event = batch(&[
            ("a", r#"{"n": 1}"#),
            ("b", r#"{"boom": true}"#),
            ("c", r#"{"n": 3}"#),
        ]);

        let response = process(&app, event, Default::default(), &Route::default())
            .await
            .unwrap();

        assert_eq!(response.failed_ids().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(app.seen.lock().unwrap().len(), 3);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"batchItemFailures": [{"itemIdentifier": "b"}]})
        );
    }

    #[tokio::test]
    async fn test_invalid_json_skips_handler() {
        let app = Recorder::default();
        let event = batch(&[("a", "not json"), ("b", r#"{"n": 2}"#)]);

        let response = process(&app, event, Default::default(), &Route::default())
            .await
            .unwrap();

        assert_eq!(response.failed_ids().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(*app.seen.lock().unwrap(), vec![json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_not_an_sqs_event() {
        let app = Recorder::default();
        let result = process(&app, json!({"httpMethod": "GET"}), Default::default(), &Route::default()).await;
        assert!(matches!(result, Err(Error::InvalidEvent(_))));
    }
}
