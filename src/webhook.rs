use aws_lambda_events::apigw::ApiGatewayV2httpResponse;
use aws_lambda_events::encodings::Body;
use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

/// Webhook ping endpoint: logs whatever it receives and answers 200.
pub async fn handler(evt: LambdaEvent<Value>) -> Result<ApiGatewayV2httpResponse, Error> {
    info!(request_id = %evt.context.request_id, "webhook event: {}", evt.payload);

    Ok(ApiGatewayV2httpResponse {
        status_code: 200,
        body: Some(Body::Text(serde_json::to_string("Hello from Lambda")?)),
        ..Default::default()
    })
}
