//! API Gateway HTTP API (payload format 2.0) events.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::{proxy::ProxyRequest, Headers, LazyBody, QueryParameters};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpApiEvent {
    pub raw_path: Option<String>,
    pub cookies: Option<Vec<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub query_string_parameters: Option<HashMap<String, String>>,
    pub path_parameters: Option<HashMap<String, String>>,
    pub request_context: HttpRequestContext,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HttpRequestContext {
    pub http: HttpDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDescription {
    pub method: String,
    pub path: Option<String>,
    pub source_ip: Option<String>,
}

/// Build the request view for an HTTP API event.
pub fn parse(event: Value, context: lambda_runtime::Context) -> Result<ProxyRequest> {
    let event: HttpApiEvent = serde_json::from_value(event).map_err(|e| {
        Error::InvalidEvent(format!("Failed to parse event from API Gateway: {}", e))
    })?;

    let http = event.request_context.http;
    let path = http.path.or(event.raw_path).unwrap_or_default();

    let mut request = ProxyRequest::new(http.method.to_ascii_uppercase(), path, context);

    let mut headers: Headers = event.headers.unwrap_or_default().into_iter().collect();
    // Format 2.0 lifts cookies out of the headers.
    if let Some(cookies) = event.cookies.filter(|c| !c.is_empty()) {
        headers.insert("cookie", cookies.join("; "));
    }
    request.headers = headers;

    let mut query = QueryParameters::new();
    for (key, value) in event.query_string_parameters.unwrap_or_default() {
        query.set(key, value);
    }
    request.query = query;

    request.path_parameters = event.path_parameters.unwrap_or_default();
    request.client_ip = http.source_ip;
    request.body = LazyBody::new(event.body, event.is_base64_encoded.unwrap_or(false));

    Ok(request)
}
