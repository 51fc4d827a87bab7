mod audio;
mod config;
mod device;
mod intent;
mod modbus;
mod speech;
mod supervisor;

use anyhow::{Context, Result};
use audio::create_audio_source;
use config::AppConfig;
use modbus::RtuClient;
use speech::create_speech_engine;
use std::time::Duration;
use supervisor::Supervisor;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AppConfig::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run(config));

    // a console read parked on stdin would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Voice fan control starting");
    info!("  Serial: {} @ {} baud", config.serial.port, config.serial.baudrate);
    info!(
        "  Fan board: unit {} register {}",
        config.serial.unit_address, config.serial.register_address
    );

    let client = RtuClient::new(config.serial.clone());
    let audio = create_audio_source(&config.audio)?;
    let engine = create_speech_engine(&config.speech, config.audio.sample_rate)?;
    info!(
        "  Capture: {} / recognizer: {}",
        audio.name(),
        engine.name()
    );

    let mut supervisor = Supervisor::new(&config, Box::new(client), audio, engine);

    // SIGTERM ends the run through the stop handle
    #[cfg(unix)]
    {
        let stop = supervisor.stop_handle();
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::spawn(async move {
            if terminate.recv().await.is_some() {
                info!("SIGTERM received, stopping system...");
                stop.request_stop("terminated");
            }
        });
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match supervisor.start(interrupt).await {
        Ok(reason) => {
            info!("Stopped: {} ({})", reason, supervisor.state());
            Ok(())
        }
        Err(e) => {
            error!("Startup failed: {} ({})", e, supervisor.state());
            Err(e.into())
        }
    }
}
