//! echo-daq binary: wires the configured instruments to the monitor
//! engine and runs one acquisition run until Ctrl-C or the sample bound.

use anyhow::{Context, Result};
use clap::Parser;
use echo_daq::config::Settings;
use echo_daq::core::MonitorEvent;
use echo_daq::monitor::{ChannelSampler, MonitorEngine};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// The TCU bus handle shared between its temperature samplers and the
/// post-run teardown.
#[cfg(feature = "instrument_serial")]
type SharedTcu = std::sync::Arc<
    std::sync::Mutex<echo_daq::instrument::Tcu<echo_daq::transport::SerialTransport>>,
>;
#[cfg(not(feature = "instrument_serial"))]
type SharedTcu = ();

#[derive(Parser, Debug)]
#[command(name = "echo-daq", about = "Evaporation chamber telemetry logger")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<String>,

    /// Output CSV path; defaults to a timestamped file in the configured
    /// log directory. Refuses to overwrite an existing file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many samples, overriding the config file.
    #[arg(long)]
    max_samples: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref()).context("loading configuration")?;
    let log_path = match cli.output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&settings.monitor.log_dir)
                .context("creating log directory")?;
            let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
            settings
                .monitor
                .log_dir
                .join(format!("echo-log-{}.csv", stamp))
        }
    };

    let (samplers, tcu) = build_samplers(&settings).context("connecting instruments")?;
    let tick = settings.monitor.tick_interval;
    let mut engine = MonitorEngine::new(samplers, tick);
    if let Some(max) = cli.max_samples.or(settings.monitor.max_samples) {
        engine = engine.with_max_samples(max);
    }

    let stop = engine.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, finishing current tick");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::Sample(record)) => {
                    info!("sample {} @ {}", record.index, record.timestamp)
                }
                Ok(MonitorEvent::ChannelStatus { channel, health }) => {
                    info!("channel '{}' -> {:?}", channel, health)
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event subscriber lagged, {} events dropped", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let summary = tokio::task::spawn_blocking(move || {
        let result = engine.run(&log_path);
        // Hand the front panel back whether the run ended or crashed.
        release_tcu(tcu);
        result
    })
    .await
    .context("monitor task panicked")??;
    info!(
        "wrote {} samples to {}",
        summary.samples,
        summary.log_path.display()
    );
    Ok(())
}

#[cfg(feature = "instrument_serial")]
fn build_samplers(settings: &Settings) -> Result<(Vec<Box<dyn ChannelSampler>>, Option<SharedTcu>)> {
    use echo_daq::instrument::{Sqc310, Tcu, Tpg261};
    use echo_daq::monitor::{
        DepositionSampler, DisabledChannel, PressureSampler, TemperatureSampler,
    };
    use echo_daq::transport::SerialTransport;
    use std::sync::{Arc, Mutex};

    let mut samplers: Vec<Box<dyn ChannelSampler>> = Vec::new();
    let mut shared_tcu = None;

    if !settings.tcu.channels.is_empty() {
        let units = settings.tcu.enabled_units();
        let tcu = if units.is_empty() {
            None
        } else {
            let transport = SerialTransport::new(&settings.tcu.port, settings.tcu.baud_rate)
                .with_parity(settings.tcu.parity)
                .with_data_bits(settings.tcu.data_bits);
            let mut tcu = Tcu::new(transport, &units);
            tcu.connect()
                .with_context(|| format!("opening TCU port {}", settings.tcu.port))?;
            Some(Arc::new(Mutex::new(tcu)))
        };
        for channel in &settings.tcu.channels {
            match (&tcu, channel.enabled) {
                (Some(tcu), true) => {
                    samplers.push(Box::new(TemperatureSampler::new(Arc::clone(tcu), channel.id)))
                }
                _ => samplers.push(Box::new(DisabledChannel::new(
                    format!("tcu unit {}", channel.id),
                    vec![format!("temp_{}", channel.id)],
                ))),
            }
        }
        shared_tcu = tcu;
    }

    if !settings.qcm.channels.is_empty() {
        let enabled = settings.qcm.enabled_channels();
        let qcm = if enabled.is_empty() {
            None
        } else {
            let transport = SerialTransport::new(&settings.qcm.port, settings.qcm.baud_rate)
                .with_flow_control();
            let mut qcm = Sqc310::new(transport);
            qcm.connect()
                .with_context(|| format!("opening QCM port {}", settings.qcm.port))?;
            info!("deposition monitor firmware: {}", qcm.version()?);
            Some(Arc::new(Mutex::new(qcm)))
        };
        for channel in &settings.qcm.channels {
            match (&qcm, channel.enabled) {
                (Some(qcm), true) => {
                    samplers.push(Box::new(DepositionSampler::new(Arc::clone(qcm), channel.id)))
                }
                _ => samplers.push(Box::new(DisabledChannel::new(
                    format!("qcm channel {}", channel.id),
                    vec![
                        format!("rate_{}", channel.id),
                        format!("thick_{}", channel.id),
                    ],
                ))),
            }
        }
    }

    if settings.pressure.enabled {
        let transport =
            SerialTransport::new(&settings.pressure.port, settings.pressure.baud_rate);
        let mut gauge = Tpg261::new(transport);
        gauge
            .connect()
            .with_context(|| format!("opening gauge port {}", settings.pressure.port))?;
        samplers.push(Box::new(PressureSampler::new(
            gauge,
            settings.pressure.gauge,
            settings.pressure.fallback_mbar,
        )));
    }

    anyhow::ensure!(!samplers.is_empty(), "no channels enabled in config");
    Ok((samplers, shared_tcu))
}

#[cfg(not(feature = "instrument_serial"))]
fn build_samplers(
    _settings: &Settings,
) -> Result<(Vec<Box<dyn ChannelSampler>>, Option<SharedTcu>)> {
    Err(echo_daq::DaqError::SerialFeatureDisabled.into())
}

/// Returns every remote TCU loop to local mode and closes the bus once the
/// run is over, so the front-panel operator gets control back.
#[cfg(feature = "instrument_serial")]
fn release_tcu(tcu: Option<SharedTcu>) {
    if let Some(tcu) = tcu {
        let mut tcu = tcu.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = tcu.release() {
            warn!("failed to release TCU bus: {}", e);
        }
    }
}

#[cfg(not(feature = "instrument_serial"))]
fn release_tcu(_tcu: Option<SharedTcu>) {}
