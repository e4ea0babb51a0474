use beacon_gateway::gateway::{Gateway, GatewayFlags, Options, RunError};
use beacon_gateway::registry::DeviceRegistry;
use beacon_gateway::sink::mqtt::MqttSink;
use beacon_gateway::source::bluer::BluerSource;
use beacon_gateway::{ConfigError, GatewayConfig};
use clap::Parser;
use log::info;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[cfg(not(feature = "bluer"))]
compile_error!("The gateway binary requires the bluer backend feature");

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[derive(Error, Debug)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Load configuration, assemble the pipeline and run it until the
/// advertisement source closes.
async fn run(options: Options) -> Result<(), MainError> {
    let config = GatewayConfig::load(&options.config)?;
    let tracking = config.tracking;

    let sweep_interval = options.sweep_interval.unwrap_or(tracking.sweep_interval());
    let publish_interval = options
        .publish_interval
        .unwrap_or(tracking.publish_interval());

    let (sink, eventloop) = MqttSink::new(&config.mqtt);
    tokio::spawn(MqttSink::drive(eventloop));

    let flags = Arc::new(GatewayFlags::default());
    flags.set_paused(options.paused);
    if options.paused {
        info!("starting paused; no advertisements will be processed");
    }

    let registry = Arc::new(DeviceRegistry::new(tracking.registry_config()));
    let gateway = Gateway::new(registry, flags).with_verbose(options.verbose);

    let source = BluerSource::new(Instant::now());
    let sink = Arc::new(sink);

    info!(
        "gateway starting: publish every {publish_interval:?}, sweep every {sweep_interval:?}"
    );
    gateway
        .run(&source, sink.clone(), sweep_interval, publish_interval)
        .await?;

    let _ = sink.disconnect().await;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Clean exit codes for process managers (e.g., systemd) that monitor
    // exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    // RUST_LOG wins when set; --verbose bumps the default filter.
    let mut logger = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => logger.parse_filters(&filters),
        Err(_) if options.verbose => logger.parse_filters("debug"),
        Err(_) => logger.parse_filters("info"),
    };
    logger.init();

    match run(options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
