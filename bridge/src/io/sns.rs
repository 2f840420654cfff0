//! SNS notifications delivered to a Lambda function.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::invocation::RouteView;
use super::{Headers, InputOutput, QueryParameters, Reply};
use crate::context::Route;
use crate::{Error, Result};

/// SNS Event wrapper
#[derive(Debug, Deserialize)]
pub struct SnsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SnsRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SnsRecord {
    #[serde(rename = "Sns")]
    pub sns: SnsMessage,
}

#[derive(Debug, Deserialize)]
pub struct SnsMessage {
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "TopicArn")]
    pub topic_arn: Option<String>,
}

/// Request view over one SNS notification. Only JSON messages are accepted.
#[derive(Debug)]
pub struct SnsNotification {
    message_id: String,
    raw_message: String,
    payload: Value,
    view: RouteView,
}

impl SnsNotification {
    pub fn new(record: SnsRecord, context: lambda_runtime::Context, route: &Route) -> Result<Self> {
        let message = record.sns;
        let payload = serde_json::from_str(&message.message).map_err(|_| {
            Error::InvalidEvent(format!(
                "SNS message {} was not a serialized JSON string",
                message.message_id
            ))
        })?;

        Ok(Self {
            message_id: message.message_id,
            raw_message: message.message,
            payload,
            view: RouteView::new(route, context),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl InputOutput for SnsNotification {
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
        Ok(Some(&self.raw_message))
    }

    fn json_body(&self) -> Result<Option<Value>> {
        Ok(Some(self.payload.clone()))
    }

    fn response_headers_mut(&mut self) -> &mut Headers {
        &mut self.view.response_headers
    }

    fn respond(&mut self, _reply: Reply) -> Result<Value> {
        Ok(Value::Null)
    }

    fn lambda_context(&self) -> &lambda_runtime::Context {
        &self.view.context
    }
}
