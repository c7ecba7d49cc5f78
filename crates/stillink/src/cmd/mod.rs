use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use stillink_session::{HandshakeConfig, SessionConfig};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod bridge;
pub mod monitor;
pub mod simulate;
pub mod tune;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a rig and print telemetry as it arrives.
    Monitor(MonitorArgs),
    /// Send a setpoint/gain update, keeping unspecified values.
    Tune(TuneArgs),
    /// Run the serial bridge against a local controller.
    Bridge(BridgeArgs),
    /// Run a simulated rig that streams telemetry.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Tune(args) => tune::run(args, format),
        Command::Bridge(args) => bridge::run(args, format),
        Command::Simulate(args) => simulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Rig address, `host[:port]` (port defaults to 8001).
    #[arg(env = "STILLINK_ADDR")]
    pub addr: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Wait for the rig to answer the connect line with ACK.
    #[arg(long)]
    pub await_ack: bool,
}

impl ConnectArgs {
    pub fn session_config(&self, read_timeout: Duration) -> CliResult<SessionConfig> {
        let connect_timeout = parse_duration(&self.connect_timeout)?;
        Ok(SessionConfig {
            connect_timeout,
            read_timeout,
            handshake: HandshakeConfig {
                timeout: connect_timeout,
                await_ack: self.await_ack,
            },
            ..SessionConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Bound on each poll; idle polls longer than this count as timeouts.
    #[arg(long, default_value = "1500ms")]
    pub poll_timeout: String,
    /// Exit after printing N samples.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print session counters on exit.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args, Debug)]
pub struct TuneArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// New setpoint. Blank keeps the rig's current value.
    #[arg(long)]
    pub setpoint: Option<String>,
    /// New proportional gain.
    #[arg(long = "p")]
    pub p_gain: Option<String>,
    /// New integral gain.
    #[arg(long = "i")]
    pub i_gain: Option<String>,
    /// New derivative gain.
    #[arg(long = "d")]
    pub d_gain: Option<String>,
    /// How long to wait for the first sample.
    #[arg(long, default_value = "10s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Serial device path.
    #[arg(long, env = "STILLINK_SERIAL_DEVICE", default_value = "/dev/serial0")]
    pub device: String,
    /// Baud rate.
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Line to write to the device on start (repeatable).
    #[arg(long = "command", value_name = "LINE")]
    pub commands: Vec<String>,
    /// Exit after printing N results.
    #[arg(long)]
    pub count: Option<usize>,
    /// Sleep between idle bridge iterations.
    #[arg(long, default_value = "10ms")]
    pub idle_interval: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(env = "STILLINK_BIND", default_value = "127.0.0.1:8001")]
    pub bind: String,
    /// Time between telemetry lines.
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Initial setpoint.
    #[arg(long, default_value_t = 78.4)]
    pub setpoint: f64,
    /// Initial ambient temperature.
    #[arg(long, default_value_t = 20.0)]
    pub temperature: f64,
    /// Send a heartbeat after every N samples (0 disables).
    #[arg(long, default_value_t = 5)]
    pub heartbeat_every: u32,
    /// Reply ACK to the connect line.
    #[arg(long)]
    pub ack: bool,
    /// Close each console connection after N samples.
    #[arg(long)]
    pub limit: Option<u64>,
    /// Exit after the first console disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Flag flipped to false on Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
