//! Direct Lambda invocation, where the event itself is the request body.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;

use super::{Headers, InputOutput, QueryParameters, Reply};
use crate::context::Route;
use crate::Result;

/// Request fields for triggers that carry no HTTP envelope.
///
/// Method and path come from the configured [`Route`]; headers, query and
/// path parameters are always empty.
#[derive(Debug)]
pub(crate) struct RouteView {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub query: QueryParameters,
    pub path_parameters: HashMap<String, String>,
    pub response_headers: Headers,
    pub context: lambda_runtime::Context,
}

impl RouteView {
    pub fn new(route: &Route, context: lambda_runtime::Context) -> Self {
        Self {
            method: route.method.to_ascii_uppercase(),
            path: route.path.clone(),
            headers: Headers::new(),
            query: QueryParameters::new(),
            path_parameters: HashMap::new(),
            response_headers: Headers::new(),
            context,
        }
    }
}

/// Request view over a direct invocation payload.
#[derive(Debug)]
pub struct Invocation {
    event: Value,
    body: OnceLock<Option<String>>,
    view: RouteView,
}

impl Invocation {
    pub fn new(event: Value, context: lambda_runtime::Context, route: &Route) -> Self {
        Self {
            event,
            body: OnceLock::new(),
            view: RouteView::new(route, context),
        }
    }

    /// The raw invocation payload.
    pub fn event(&self) -> &Value {
        &self.event
    }
}

impl InputOutput for Invocation {
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
        if let Some(body) = self.body.get() {
            return Ok(body.as_deref());
        }
        let body = match &self.event {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(serde_json::to_string(other)?),
        };
        Ok(self.body.get_or_init(|| body).as_deref())
    }

    /// The event as delivered. String payloads are not parsed a second time.
    fn json_body(&self) -> Result<Option<Value>> {
        match &self.event {
            Value::Null => Ok(None),
            other => Ok(Some(other.clone())),
        }
    }

    fn response_headers_mut(&mut self) -> &mut Headers {
        &mut self.view.response_headers
    }

    /// Direct invocations return the body itself, without an HTTP envelope.
    fn respond(&mut self, reply: Reply) -> Result<Value> {
        reply.body.into_value()
    }

    fn lambda_context(&self) -> &lambda_runtime::Context {
        &self.view.context
    }
}
