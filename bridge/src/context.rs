//! Trigger selection and request dispatch.
//!
//! A [`Context`] is configured with one [`TriggerKind`] and one
//! [`Application`]. Each invocation builds the matching [`EventAdapter`],
//! hands it to the application and serializes the reply for the trigger.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use lambda_runtime::LambdaEvent;
use serde_json::Value;
use tracing::{debug, info};

use crate::batch;
use crate::io::invocation::Invocation;
use crate::io::sns::{SnsEvent, SnsNotification};
use crate::io::sqs::SqsRecord;
use crate::io::{alb, api_gateway, api_gateway_v2, InputOutput, ProxyRequest, Reply};
use crate::{Error, Result};

/// The Lambda trigger a function is deployed behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Alb,
    RestApi,
    HttpApi,
    Invocation,
    SqsBatch,
    Sns,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Alb => "alb",
            TriggerKind::RestApi => "rest-api",
            TriggerKind::HttpApi => "http-api",
            TriggerKind::Invocation => "invocation",
            TriggerKind::SqsBatch => "sqs-batch",
            TriggerKind::Sns => "sns",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alb" => Ok(TriggerKind::Alb),
            "rest-api" | "api-gateway" => Ok(TriggerKind::RestApi),
            "http-api" | "api-gateway-v2" => Ok(TriggerKind::HttpApi),
            "invocation" => Ok(TriggerKind::Invocation),
            "sqs-batch" | "sqs" => Ok(TriggerKind::SqsBatch),
            "sns" => Ok(TriggerKind::Sns),
            other => Err(Error::Config(format!("Unknown trigger kind '{}'", other))),
        }
    }
}

/// Method and path reported for triggers that carry no HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: String,
    pub path: String,
}

impl Route {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

impl Default for Route {
    fn default() -> Self {
        Self::new("GET", "")
    }
}

/// One invocation's request view, tagged by trigger.
#[derive(Debug)]
pub enum EventAdapter {
    Alb(ProxyRequest),
    RestApi(ProxyRequest),
    HttpApi(ProxyRequest),
    Invocation(Invocation),
    SqsRecord(SqsRecord),
    Sns(SnsNotification),
}

impl EventAdapter {
    /// Build the adapter for a single-request trigger.
    ///
    /// Batch triggers (SQS, SNS) carry several records and go through
    /// [`Context::handle`] instead.
    pub fn from_event(
        kind: TriggerKind,
        event: Value,
        context: lambda_runtime::Context,
        route: &Route,
    ) -> Result<Self> {
        match kind {
            TriggerKind::Alb => alb::parse(event, context).map(EventAdapter::Alb),
            TriggerKind::RestApi => api_gateway::parse(event, context).map(EventAdapter::RestApi),
            TriggerKind::HttpApi => {
                api_gateway_v2::parse(event, context).map(EventAdapter::HttpApi)
            }
            TriggerKind::Invocation => {
                Ok(EventAdapter::Invocation(Invocation::new(event, context, route)))
            }
            TriggerKind::SqsBatch | TriggerKind::Sns => Err(Error::Unsupported(format!(
                "{} events carry multiple records and cannot be adapted as a single request",
                kind
            ))),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            EventAdapter::Alb(_) => TriggerKind::Alb,
            EventAdapter::RestApi(_) => TriggerKind::RestApi,
            EventAdapter::HttpApi(_) => TriggerKind::HttpApi,
            EventAdapter::Invocation(_) => TriggerKind::Invocation,
            EventAdapter::SqsRecord(_) => TriggerKind::SqsBatch,
            EventAdapter::Sns(_) => TriggerKind::Sns,
        }
    }

    pub fn as_io(&self) -> &dyn InputOutput {
        match self {
            EventAdapter::Alb(io) | EventAdapter::RestApi(io) | EventAdapter::HttpApi(io) => io,
            EventAdapter::Invocation(io) => io,
            EventAdapter::SqsRecord(io) => io,
            EventAdapter::Sns(io) => io,
        }
    }

    pub fn as_io_mut(&mut self) -> &mut dyn InputOutput {
        match self {
            EventAdapter::Alb(io) | EventAdapter::RestApi(io) | EventAdapter::HttpApi(io) => io,
            EventAdapter::Invocation(io) => io,
            EventAdapter::SqsRecord(io) => io,
            EventAdapter::Sns(io) => io,
        }
    }
}

/// User code served behind a trigger.
///
/// Errors returned here surface to the Lambda platform, except under the SQS
/// batch trigger where they only mark the current record as failed.
#[async_trait]
pub trait Application: Send + Sync {
    async fn handle(&self, io: &mut dyn InputOutput) -> anyhow::Result<Reply>;
}

/// Binds an application to the trigger it is deployed behind.
pub struct Context<A> {
    trigger: TriggerKind,
    route: Route,
    application: A,
}

impl<A: Application> Context<A> {
    pub fn new(trigger: TriggerKind, application: A) -> Self {
        Self {
            trigger,
            route: Route::default(),
            application,
        }
    }

    /// Method and path reported to the application for non-HTTP triggers.
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    pub fn application(&self) -> &A {
        &self.application
    }

    /// Handle one Lambda invocation, returning the trigger's response payload.
    pub async fn handle(&self, event: LambdaEvent<Value>) -> Result<Value> {
        let (payload, context) = event.into_parts();
        debug!(trigger = %self.trigger, request_id = %context.request_id, "Handling invocation");

        match self.trigger {
            TriggerKind::SqsBatch => {
                let response =
                    batch::process(&self.application, payload, context, &self.route).await?;
                Ok(serde_json::to_value(response)?)
            }
            TriggerKind::Sns => {
                let event: SnsEvent = serde_json::from_value(payload).map_err(|e| {
                    Error::InvalidEvent(format!("Failed to parse event from SNS: {}", e))
                })?;
                for record in event.records {
                    let notification = SnsNotification::new(record, context.clone(), &self.route)?;
                    info!(message_id = %notification.message_id(), "Processing SNS message");
                    self.run(EventAdapter::Sns(notification)).await?;
                }
                Ok(Value::Null)
            }
            kind => {
                let adapter = EventAdapter::from_event(kind, payload, context, &self.route)?;
                self.run(adapter).await
            }
        }
    }

    async fn run(&self, mut adapter: EventAdapter) -> Result<Value> {
        let reply = self.application.handle(adapter.as_io_mut()).await?;
        adapter.as_io_mut().respond(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_kind_round_trip() {
        for kind in [
            TriggerKind::Alb,
            TriggerKind::RestApi,
            TriggerKind::HttpApi,
            TriggerKind::Invocation,
            TriggerKind::SqsBatch,
            TriggerKind::Sns,
        ] {
            assert_eq!(kind.as_str().parse::<TriggerKind>().unwrap(), kind);
        }
        assert_eq!("API-Gateway".parse::<TriggerKind>().unwrap(), TriggerKind::RestApi);
        assert!(matches!("kinesis".parse::<TriggerKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_batch_triggers_are_not_single_requests() {
        let err = EventAdapter::from_event(
            TriggerKind::SqsBatch,
            serde_json::json!({"Records": []}),
            lambda_runtime::Context::default(),
            &Route::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_adapter_kind() {
        let adapter = EventAdapter::from_event(
            TriggerKind::Invocation,
            serde_json::json!({"a": 1}),
            lambda_runtime::Context::default(),
            &Route::new("post", "/x"),
        )
        .unwrap();
        assert_eq!(adapter.kind(), TriggerKind::Invocation);
        assert_eq!(adapter.as_io().request_method(), "POST");
    }
}
