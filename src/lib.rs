use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use aws_lambda_events::encodings::Body;
use base64::prelude::*;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use lambda_runtime::{Error, LambdaEvent};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::forward::ForwardError;
use crate::publish::Publisher;

pub mod config;
pub mod forward;
pub mod publish;
pub mod telemetry;
pub mod webhook;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();
}

// lambda handler
pub async fn function_handler(
    publisher: &dyn Publisher,
    config: &Config,
    evt: LambdaEvent<ApiGatewayV2httpRequest>,
) -> Result<ApiGatewayV2httpResponse, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    let result = match request_body(evt.payload) {
        Ok(body) => forward::normalize_batch(&body, publisher, config).await,
        Err(error) => Err(error),
    };

    let response = match result {
        Ok(_) => json_response(200, json!({"message": "Data successfully sent"})),
        Err(error) => {
            forward::log_failure(&error);
            let message = if error.is_delivery_failure() {
                "Failed to send data"
            } else {
                "An error occurred"
            };
            json_response(
                500,
                json!({"message": message, "error": error.to_string()}),
            )
        }
    };

    Ok(response)
}

/// Extracts the posted body, undoing the gateway's base64 encoding if applied.
pub fn request_body(request: ApiGatewayV2httpRequest) -> Result<String, ForwardError> {
    let body = request
        .body
        .ok_or_else(|| ForwardError::Parse("request body is empty".to_string()))?;

    if !request.is_base64_encoded {
        return Ok(body);
    }

    let decoded = BASE64_STANDARD
        .decode(body.as_bytes())
        .map_err(|e| ForwardError::Parse(format!("invalid base64 body: {}", e)))?;
    String::from_utf8(decoded)
        .map_err(|e| ForwardError::Parse(format!("body is not valid UTF-8: {}", e)))
}

fn json_response(status_code: i64, body: serde_json::Value) -> ApiGatewayV2httpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    ApiGatewayV2httpResponse {
        status_code,
        headers,
        body: Some(Body::Text(body.to_string())),
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = ApiGatewayV2httpRequest {
            body: Some("[]".to_string()),
            ..Default::default()
        };
        assert_eq!(request_body(request).unwrap(), "[]");

        let request = ApiGatewayV2httpRequest {
            body: Some(BASE64_STANDARD.encode(r#"[{"uniqueId":"abc"}]"#)),
            is_base64_encoded: true,
            ..Default::default()
        };
        assert_eq!(request_body(request).unwrap(), r#"[{"uniqueId":"abc"}]"#);
    }

    #[test]
    fn test_request_body_errors() {
        let err = request_body(ApiGatewayV2httpRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "request body is empty");

        let request = ApiGatewayV2httpRequest {
            body: Some("not base64!".to_string()),
            is_base64_encoded: true,
            ..Default::default()
        };
        assert!(matches!(request_body(request), Err(ForwardError::Parse(_))));

        let request = ApiGatewayV2httpRequest {
            body: Some(BASE64_STANDARD.encode([0xff, 0xfe])),
            is_base64_encoded: true,
            ..Default::default()
        };
        assert!(matches!(request_body(request), Err(ForwardError::Parse(_))));
    }
}
