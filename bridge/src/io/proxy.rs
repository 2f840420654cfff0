//! Normalized HTTP request shared by the ALB and API Gateway adapters.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::{Headers, InputOutput, LazyBody, QueryParameters, Reply, DEFAULT_CONTENT_TYPE};
use crate::Result;

/// Response envelope understood by ALB and both API Gateway flavours.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// HTTP request fields projected out of a proxy-style trigger event.
#[derive(Debug)]
pub struct ProxyRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) resource: Option<String>,
    pub(crate) headers: Headers,
    pub(crate) query: QueryParameters,
    pub(crate) path_parameters: HashMap<String, String>,
    pub(crate) client_ip: Option<String>,
    pub(crate) body: LazyBody,
    pub(crate) response_headers: Headers,
    pub(crate) context: lambda_runtime::Context,
}

impl ProxyRequest {
    pub(crate) fn new(method: String, path: String, context: lambda_runtime::Context) -> Self {
        Self {
            method,
            path,
            resource: None,
            headers: Headers::new(),
            query: QueryParameters::new(),
            path_parameters: HashMap::new(),
            client_ip: None,
            body: LazyBody::default(),
            response_headers: Headers::new(),
            context,
        }
    }
}

impl InputOutput for ProxyRequest {
    fn request_method(&self) -> &str {
        &self.method
    }

    fn path_info(&self) -> &str {
        &self.path
    }

    fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    fn request_headers(&self) -> &Headers {
        &self.headers
    }

    fn query_parameters(&self) -> &QueryParameters {
        &self.query
    }

    fn path_parameters(&self) -> &HashMap<String, String> {
        &self.path_parameters
    }

    fn client_ip(&self) -> Option<&str> {
        self.client_ip
            .as_deref()
            .or_else(|| self.headers.get("x-forwarded-for"))
    }

    fn body(&self) -> Result<Option<&str>> {
        self.body.get()
    }

    fn response_headers_mut(&mut self) -> &mut Headers {
        &mut self.response_headers
    }

    fn respond(&mut self, reply: Reply) -> Result<Value> {
        let mut headers = std::mem::take(&mut self.response_headers);
        headers.extend(reply.headers);
        if !headers.contains("content-type") {
            headers.insert("content-type", DEFAULT_CONTENT_TYPE);
        }

        let response = ProxyResponse {
            status_code: reply.status,
            headers,
            body: reply.body.into_text()?,
            is_base64_encoded: false,
        };

        Ok(serde_json::to_value(response)?)
    }

    fn lambda_context(&self) -> &lambda_runtime::Context {
        &self.context
    }
}
