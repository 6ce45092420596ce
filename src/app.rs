//! Core application runner for `scale-bridge`.
//!
//! Wires the serial supervisor, the latest-reading store and the query
//! endpoint together. Kept apart from process exit codes so the whole
//! pipeline can be tested with a fake device.

use crate::decoder::FrameDecoder;
use crate::duration::{parse_duration, parse_nonzero_duration};
use crate::framing::{DEFAULT_MAX_FRAME_LENGTH, DelimiterFramer};
use crate::http;
use crate::protocol::{FrameProtocol, Preset, ProtocolError, WeightLimits, parse_delimiter};
use crate::serial::{Device, Parity, SerialDevice, SerialSettings, Shutdown, Supervisor};
use crate::store::LatestReading;
use clap::Parser;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Serial device the scale is attached to (e.g. /dev/ttyUSB0, COM3)
    #[arg(short = 'd', long)]
    pub device: String,

    /// Serial line speed
    #[arg(long, default_value_t = 9600)]
    pub baud_rate: u32,

    /// Data bits per character
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u8).range(5..=8))]
    pub data_bits: u8,

    /// Parity checking mode
    #[arg(long, default_value_t, value_enum)]
    pub parity: Parity,

    /// Stop bits per character
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: u8,

    /// Byte terminating each frame, decimal or hex (0x0D)
    #[arg(long, default_value = "0x0D", value_parser = parse_delimiter)]
    pub delimiter: u8,

    /// Scale protocol variant supplying the prefix and digit counts
    #[arg(long, default_value_t, value_enum)]
    pub preset: Preset,

    /// Override the frame prefix literal of the preset
    #[arg(long)]
    pub prefix: Option<String>,

    /// Override the number of weight digits of the preset
    #[arg(long)]
    pub weight_digits: Option<usize>,

    /// Override the number of trailing status digits of the preset
    #[arg(long)]
    pub trailing_digits: Option<usize>,

    /// Reject readings below this weight (kg)
    #[arg(long)]
    pub min_weight: Option<f64>,

    /// Reject readings above this weight (kg)
    #[arg(long)]
    pub max_weight: Option<f64>,

    /// Address for the HTTP query endpoint
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Wait before reopening the device after a fault.
    /// Accepts duration with suffix: 2s, 500ms, 1m.
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub reopen_delay: Duration,

    /// How long to wait for the device to close on shutdown
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub shutdown_timeout: Duration,

    /// Timeout of a single serial read, also the shutdown polling interval
    #[arg(long, default_value = "100ms", value_parser = parse_nonzero_duration)]
    pub read_timeout: Duration,

    /// Discard buffered bytes when no delimiter arrives within this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LENGTH)]
    pub max_frame_length: usize,

    /// Verbose output, log every reading and port state change
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Frame protocol from the preset with any explicit overrides applied.
    pub fn protocol(&self) -> FrameProtocol {
        let preset = self.preset.protocol();
        FrameProtocol {
            prefix: self.prefix.clone().unwrap_or(preset.prefix),
            weight_digits: self.weight_digits.unwrap_or(preset.weight_digits),
            trailing_digits: self.trailing_digits.unwrap_or(preset.trailing_digits),
        }
    }

    pub fn weight_limits(&self) -> Result<WeightLimits, ProtocolError> {
        WeightLimits::new(self.min_weight, self.max_weight)
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            path: self.device.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            read_timeout: self.read_timeout,
        }
    }
}

/// Errors that prevent the bridge from starting.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid frame protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Run the bridge against the configured serial port until interrupted.
pub async fn run(options: Options) -> Result<(), RunError> {
    let listener = TcpListener::bind(options.listen)
        .await
        .map_err(|source| RunError::Bind {
            addr: options.listen,
            source,
        })?;
    let device = SerialDevice::new(options.serial_settings());

    run_with_device(options, device, listener, shutdown_signal()).await
}

/// Run the bridge with an injected device and listener until `shutdown_signal` resolves.
///
/// - The device is supervised on a blocking thread and reopened after every fault.
/// - Queries are served from the listener until the signal fires.
/// - On the signal the device is closed, waiting at most `options.shutdown_timeout`.
pub async fn run_with_device<D, S>(
    options: Options,
    device: D,
    listener: TcpListener,
    shutdown_signal: S,
) -> Result<(), RunError>
where
    D: Device + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let protocol = options.protocol();
    let decoder = FrameDecoder::with_limits(&protocol, options.weight_limits()?)?;
    let framer = DelimiterFramer::new(options.delimiter, options.max_frame_length);
    let store = LatestReading::new();
    let shutdown = Shutdown::new();

    info!(
        prefix = %protocol.prefix,
        weight_digits = protocol.weight_digits,
        trailing_digits = protocol.trailing_digits,
        delimiter = %format!("{:#04X}", options.delimiter),
        "frame protocol"
    );

    let supervisor = Supervisor::new(device, decoder, framer, store.clone(), shutdown.clone())
        .with_reopen_delay(options.reopen_delay);
    let reader = tokio::task::spawn_blocking(move || supervisor.run());

    http::serve(listener, store, shutdown_signal).await;

    info!("shutting down");
    shutdown.trigger();
    match tokio::time::timeout(options.shutdown_timeout, reader).await {
        Ok(Ok(())) => info!("serial supervisor stopped"),
        Ok(Err(join_error)) => error!(error = %join_error, "serial supervisor panicked"),
        Err(_) => warn!(
            timeout = ?options.shutdown_timeout,
            "serial port did not close in time, exiting anyway"
        ),
    }

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received"),
        _ = terminate => info!("terminate signal received"),
    }
}
