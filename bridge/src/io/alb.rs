//! Application Load Balancer target group events.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::api_gateway::{merge_headers, merge_query};
use super::{proxy::ProxyRequest, LazyBody};
use crate::{Error, Result};

const ALLOWED_METHODS: [&str; 7] = ["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbEvent {
    pub http_method: String,
    pub path: String,
    pub headers: Option<HashMap<String, String>>,
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    pub query_string_parameters: Option<HashMap<String, String>>,
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
}

/// Build the request view for an ALB event.
pub fn parse(event: Value, context: lambda_runtime::Context) -> Result<ProxyRequest> {
    let event: AlbEvent = serde_json::from_value(event).map_err(|e| {
        Error::InvalidEvent(format!("Failed to parse event from ALB: {}", e))
    })?;

    let method = event.http_method.to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(Error::InvalidEvent(format!(
            "Unsupported HTTP method: {}",
            method
        )));
    }

    let mut request = ProxyRequest::new(method, event.path, context);
    request.headers = merge_headers(event.headers, event.multi_value_headers);
    request.query = merge_query(
        event.query_string_parameters,
        event.multi_value_query_string_parameters,
    );
    request.body = LazyBody::new(event.body, event.is_base64_encoded.unwrap_or(false));

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InputOutput;
    use serde_json::json;

    fn event() -> Value {
        json!({
            "requestContext": {
                "elb": {"targetGroupArn": "arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/lambda/abc"}
            },
            "httpMethod": "get",
            "path": "/search",
            "queryStringParameters": {"q": "red%20shoes", "size": "10"},
            "headers": {
                "Host": "lb.example.com",
                "X-Forwarded-For": "72.12.164.125",
                "X-Forwarded-Proto": "https"
            },
            "body": "",
            "isBase64Encoded": false
        })
    }

    #[test]
    fn test_field_mapping() {
        let request = parse(event(), lambda_runtime::Context::default()).unwrap();

        assert_eq!(request.request_method(), "GET");
        assert_eq!(request.path_info(), "/search");
        assert_eq!(request.resource(), None);
        assert!(request.path_parameters().is_empty());
        assert_eq!(request.request_header("host", false).unwrap(), "lb.example.com");
        assert_eq!(request.client_ip(), Some("72.12.164.125"));
        assert!(!request.has_body().unwrap());
    }

    #[test]
    fn test_query_values_pass_through() {
        let request = parse(event(), lambda_runtime::Context::default()).unwrap();
        assert_eq!(request.query_parameter("q"), ["red%20shoes"]);
        assert_eq!(request.query_parameter("size"), ["10"]);

        let request = parse(
            json!({
                "httpMethod": "GET",
                "path": "/s",
                "queryStringParameters": {"q": "a+b", "p": "50%25"}
            }),
            lambda_runtime::Context::default(),
        )
        .unwrap();
        assert_eq!(request.query_parameter("q"), ["a+b"]);
        assert_eq!(request.query_parameter("p"), ["50%25"]);
    }

    #[test]
    fn test_rejects_unknown_method() {
        let mut event = event();
        event["httpMethod"] = json!("TRACE");
        let err = parse(event, lambda_runtime::Context::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(ref msg) if msg.contains("TRACE")));
    }

    #[test]
    fn test_multi_value_mode() {
        let request = parse(
            json!({
                "httpMethod": "POST",
                "path": "/upload",
                "multiValueHeaders": {"X-Forwarded-For": ["1.1.1.1"]},
                "multiValueQueryStringParameters": {"id": ["1", "2"]},
                "body": "aGk=",
                "isBase64Encoded": true
            }),
            lambda_runtime::Context::default(),
        )
        .unwrap();

        assert_eq!(request.query_parameter("id"), ["1", "2"]);
        assert_eq!(request.client_ip(), Some("1.1.1.1"));
        assert_eq!(request.body().unwrap(), Some("hi"));
    }
}
