//! Request views and response builders for each Lambda trigger.
//!
//! Every trigger adapter implements [`InputOutput`]: a read-only view of the
//! inbound event (method, path, headers, query, body) plus `respond`, which
//! serializes a [`Reply`] into the envelope that trigger expects.

pub mod alb;
pub mod api_gateway;
pub mod api_gateway_v2;
pub mod invocation;
pub mod proxy;
pub mod sns;
pub mod sqs;

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

pub use proxy::{ProxyRequest, ProxyResponse};

/// Content type applied to responses that do not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Uniform view over one trigger event, owned by a single invocation.
pub trait InputOutput: Send + Sync {
    /// HTTP verb, or the configured route method for non-HTTP triggers.
    fn request_method(&self) -> &str;

    /// Request path, or the configured route path (possibly empty).
    fn path_info(&self) -> &str;

    /// Matched resource template, where the trigger reports one.
    fn resource(&self) -> Option<&str> {
        None
    }

    fn script_name(&self) -> &str {
        ""
    }

    fn protocol(&self) -> &str {
        "https"
    }

    fn request_headers(&self) -> &Headers;

    fn has_request_header(&self, name: &str) -> bool {
        self.request_headers().contains(name)
    }

    /// Case-insensitive header lookup.
    ///
    /// An absent header is an error unless `silent` is set, in which case the
    /// empty string is returned.
    fn request_header(&self, name: &str, silent: bool) -> Result<&str> {
        match self.request_headers().get(name) {
            Some(value) => Ok(value),
            None if silent => Ok(""),
            None => Err(Error::MissingField(format!(
                "HTTP header '{}' was not found in request",
                name
            ))),
        }
    }

    fn content_type(&self) -> &str {
        self.request_headers().get("content-type").unwrap_or_default()
    }

    fn query_parameters(&self) -> &QueryParameters;

    /// All values for a query parameter; empty when absent.
    fn query_parameter(&self, key: &str) -> &[String] {
        self.query_parameters().get(key)
    }

    fn query_string(&self) -> String {
        self.query_parameters().to_query_string()
    }

    fn path_parameters(&self) -> &HashMap<String, String>;

    fn client_ip(&self) -> Option<&str>;

    /// The request body, base64-decoded on first access when the event says so.
    fn body(&self) -> Result<Option<&str>>;

    fn has_body(&self) -> Result<bool> {
        Ok(self.body()?.is_some_and(|body| !body.is_empty()))
    }

    /// The body parsed as JSON, `None` when there is no body.
    fn json_body(&self) -> Result<Option<Value>> {
        match self.body()? {
            Some(body) if !body.is_empty() => serde_json::from_str(body)
                .map(Some)
                .map_err(|e| Error::InvalidBody(format!("Request body was not valid JSON: {}", e))),
            _ => Ok(None),
        }
    }

    /// Headers to include in the eventual response.
    fn response_headers_mut(&mut self) -> &mut Headers;

    /// Serialize a reply into this trigger's response shape.
    fn respond(&mut self, reply: Reply) -> Result<Value>;

    fn lambda_context(&self) -> &lambda_runtime::Context;
}

/// Header map with case-insensitive names (stored lower-cased).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn extend(&mut self, other: Headers) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Query parameters, each name mapping to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters(BTreeMap<String, Vec<String>>);

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// Replace all values of `key`.
    pub fn set_all(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// URL-encoded `key=value&...`, repeating keys that carry several values.
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .flat_map(|(key, values)| {
                values.iter().map(move |value| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Body of a reply before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl ResponseBody {
    /// Bytes decode as UTF-8, text passes through, anything else becomes JSON text.
    pub fn into_text(self) -> Result<String> {
        match self {
            ResponseBody::Bytes(bytes) => String::from_utf8(bytes)
                .map_err(|e| Error::InvalidBody(format!("Response body is not valid UTF-8: {}", e))),
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }

    /// Like [`into_text`](Self::into_text) but keeps structured data structured.
    pub fn into_value(self) -> Result<Value> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            other => other.into_text().map(Value::String),
        }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::Bytes(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        ResponseBody::Json(value)
    }
}

/// What an application hands back for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: ResponseBody,
    pub headers: Headers,
}

impl Reply {
    pub fn new(body: impl Into<ResponseBody>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Headers::new(),
        }
    }

    /// Serialize any `Serialize` value as the JSON body.
    pub fn json<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Lazily decoded request body, cached after the first access.
#[derive(Debug, Default)]
pub(crate) struct LazyBody {
    raw: Option<String>,
    base64: bool,
    decoded: OnceLock<Option<String>>,
}

impl LazyBody {
    pub fn new(raw: Option<String>, base64: bool) -> Self {
        Self {
            raw,
            base64,
            decoded: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<Option<&str>> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded.as_deref());
        }

        let decoded = match &self.raw {
            Some(raw) if self.base64 => Some(decode_base64_text(raw)?),
            raw => raw.clone(),
        };

        Ok(self.decoded.get_or_init(|| decoded).as_deref())
    }
}

fn decode_base64_text(raw: &str) -> Result<String> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::InvalidBody(format!("Body is not valid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::InvalidBody(format!("Decoded body is not valid UTF-8: {}", e)))
}
