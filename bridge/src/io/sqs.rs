//! SQS messages delivered to a Lambda function.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::invocation::RouteView;
use super::{Headers, InputOutput, QueryParameters, Reply};
use crate::context::Route;
use crate::{Error, Result};

/// SQS event wrapper
#[derive(Debug, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SqsMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    pub message_id: String,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub event_source: Option<String>,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: Option<String>,
}

/// Request view over one SQS message whose body has already been parsed as JSON.
#[derive(Debug)]
pub struct SqsRecord {
    message_id: String,
    raw_body: String,
    payload: Value,
    view: RouteView,
}

impl SqsRecord {
    /// Parse the message body as JSON. A missing or malformed body is rejected.
    pub fn new(message: SqsMessage, context: lambda_runtime::Context, route: &Route) -> Result<Self> {
        let raw_body = message.body.ok_or_else(|| {
            Error::InvalidBody(format!("SQS message {} has no body", message.message_id))
        })?;
        let payload = serde_json::from_str(&raw_body).map_err(|e| {
            Error::InvalidBody(format!(
                "SQS message {} was not valid JSON: {}",
                message.message_id, e
            ))
        })?;

        Ok(Self {
            message_id: message.message_id,
            raw_body,
            payload,
            view: RouteView::new(route, context),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl InputOutput for SqsRecord {
    fn request_method(&self) -> &str {
        &self.view.method
    }

    fn path_info(&self) -> &str {
        &self.view.path
    }

    fn request_headers(&self) -> &Headers {
        &self.view.headers
    }

    fn query_parameters(&self) -> &QueryParameters {
        &self.view.query
    }

    fn path_parameters(&self) -> &HashMap<String, String> {
        &self.view.path_parameters
    }

    fn client_ip(&self) -> Option<&str> {
        None
    }

    fn body(&self) -> Result<Option<&str>> {
        Ok(Some(&self.raw_body))
    }

    fn json_body(&self) -> Result<Option<Value>> {
        Ok(Some(self.payload.clone()))
    }

    fn response_headers_mut(&mut self) -> &mut Headers {
        &mut self.view.response_headers
    }

    /// Queue consumers have nobody to answer.
    fn respond(&mut self, _reply: Reply) -> Result<Value> {
        Ok(Value::Null)
    }

    fn lambda_context(&self) -> &lambda_runtime::Context {
        &self.view.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(body: Option<&str>) -> SqsMessage {
        SqsMessage {
            message_id: "059f36b4-87a3-44ab-83d2-661975830a7d".into(),
            receipt_handle: None,
            body: body.map(String::from),
            attributes: HashMap::new(),
            event_source: Some("aws:sqs".into()),
            event_source_arn: None,
        }
    }

    #[test]
    fn test_parses_event_shape() {
        let event: SqsEvent = serde_json::from_value(json!({
            "Records": [{
                "messageId": "m-1",
                "receiptHandle": "AQEB...",
                "body": "{\"order\": 1}",
                "attributes": {"ApproximateReceiveCount": "1"},
                "messageAttributes": {},
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:us-east-2:123456789012:orders"
            }]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].message_id, "m-1");
        assert_eq!(
            event.records[0].event_source_arn.as_deref(),
            Some("arn:aws:sqs:us-east-2:123456789012:orders")
        );
    }

    #[test]
    fn test_record_view() {
        let record = SqsRecord::new(
            message(Some("{\"order\": 1}")),
            lambda_runtime::Context::default(),
            &Route::new("POST", "/orders"),
        )
        .unwrap();

        assert_eq!(record.request_method(), "POST");
        assert_eq!(record.path_info(), "/orders");
        assert_eq!(record.json_body().unwrap(), Some(json!({"order": 1})));
        assert!(record.has_body().unwrap());
        assert!(record.request_headers().is_empty());
    }

    #[test]
    fn test_rejects_non_json_body() {
        let err = SqsRecord::new(
            message(Some("plain text")),
            lambda_runtime::Context::default(),
            &Route::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidBody(_)));

        let err = SqsRecord::new(message(None), lambda_runtime::Context::default(), &Route::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBody(_)));
    }
}
