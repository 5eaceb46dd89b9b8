use lambda_runtime::{run, service_fn, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    bms_telemetry_forwarder::set_up_logging();

    info!("Initializing webhook version {}", env!("CARGO_PKG_VERSION"));

    run(service_fn(bms_telemetry_forwarder::webhook::handler)).await
}
