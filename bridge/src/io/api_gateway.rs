//! API Gateway REST API (payload format 1.0) events.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::{proxy::ProxyRequest, Headers, LazyBody, QueryParameters};
use crate::{Error, Result};

/// REST API proxy integration event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestApiEvent {
    pub http_method: String,
    pub path: String,
    pub resource: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    pub query_string_parameters: Option<HashMap<String, String>>,
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    pub path_parameters: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
    pub request_context: Option<RestRequestContext>,
}

#[derive(Debug, Deserialize)]
pub struct RestRequestContext {
    pub identity: Option<RestIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestIdentity {
    pub source_ip: Option<String>,
}

/// Merge single and multi-value headers, multi-value entries winning.
pub(crate) fn merge_headers(
    single: Option<HashMap<String, String>>,
    multi: Option<HashMap<String, Vec<String>>>,
) -> Headers {
    let mut headers: Headers = single.unwrap_or_default().into_iter().collect();
    for (name, values) in multi.unwrap_or_default() {
        headers.insert(name, values.join(", "));
    }
    headers
}

/// Merge single and multi-value query parameters, multi-value entries winning.
pub(crate) fn merge_query(
    single: Option<HashMap<String, String>>,
    multi: Option<HashMap<String, Vec<String>>>,
) -> QueryParameters {
    let mut query = QueryParameters::new();
    for (key, value) in single.unwrap_or_default() {
        query.set(key, value);
    }
    for (key, values) in multi.unwrap_or_default() {
        query.set_all(key, values);
    }
    query
}

/// Build the request view for a REST API event.
pub fn parse(event: Value, context: lambda_runtime::Context) -> Result<ProxyRequest> {
    let event: RestApiEvent = serde_json::from_value(event).map_err(|e| {
        Error::InvalidEvent(format!("Failed to parse event from API Gateway: {}", e))
    })?;

    let mut request = ProxyRequest::new(event.http_method.to_ascii_uppercase(), event.path, context);
    request.resource = event.resource;
    request.headers = merge_headers(event.headers, event.multi_value_headers);
    request.query = merge_query(
        event.query_string_parameters,
        event.multi_value_query_string_parameters,
    );
    request.path_parameters = event.path_parameters.unwrap_or_default();
    request.client_ip = event
        .request_context
        .and_then(|ctx| ctx.identity)
        .and_then(|identity| identity.source_ip);
    request.body = LazyBody::new(event.body, event.is_base64_encoded.unwrap_or(false));

    Ok(request)
}
