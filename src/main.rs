use bms_telemetry_forwarder::config;
use bms_telemetry_forwarder::publish::KafkaPublisher;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use aws_lambda_events::apigw::ApiGatewayV2httpRequest;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    bms_telemetry_forwarder::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = config::Config::load_from_env()?;
    info!(publish_mode = %config.publish_mode, "configuration loaded");

    // one producer per execution environment, reused across invocations
    let publisher = KafkaPublisher::new(&config)?;

    run(service_fn(|request: LambdaEvent<ApiGatewayV2httpRequest>| {
        bms_telemetry_forwarder::function_handler(&publisher, &config, request)
    }))
    .await
}
