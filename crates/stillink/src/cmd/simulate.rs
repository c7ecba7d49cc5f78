use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use stillink_message::{CommandMessage, PidGains, TelemetrySample};
use stillink_session::{HandshakeConfig, RigLink, RigListener, SessionError};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, SimulateArgs};
use crate::exit::{message_error, session_error, CliResult, SUCCESS};

/// Fraction of the setpoint error closed per simulated second.
const RESPONSE_RATE: f64 = 0.05;

/// First-order thermal model standing in for the still.
#[derive(Debug, Clone)]
struct SimulatedRig {
    temperature: f64,
    setpoint: f64,
    runtime: f64,
    gains: PidGains,
}

impl SimulatedRig {
    fn new(temperature: f64, setpoint: f64) -> Self {
        Self {
            temperature,
            setpoint,
            runtime: 0.0,
            gains: PidGains::new(28.0, 1.0, 18.0),
        }
    }

    fn advance(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let step = (RESPONSE_RATE * dt).min(1.0);
        self.temperature += (self.setpoint - self.temperature) * step;
        self.runtime += dt;
    }

    fn element_status(&self) -> &'static str {
        if self.temperature < self.setpoint - 0.05 {
            "HEATING"
        } else {
            "IDLE"
        }
    }

    fn sample(&self) -> stillink_message::Result<TelemetrySample> {
        // Two decimals keep the wire lines readable.
        let round = |v: f64| (v * 100.0).round() / 100.0;
        TelemetrySample::new(
            round(self.temperature),
            self.setpoint,
            round(self.runtime),
            self.element_status(),
            self.gains,
        )
    }

    fn apply(&mut self, command: &CommandMessage) {
        match command {
            CommandMessage::TuneRequest(request) => {
                info!(
                    setpoint = request.setpoint(),
                    p = request.gains().p,
                    i = request.gains().i,
                    d = request.gains().d,
                    "tune request applied"
                );
                self.setpoint = request.setpoint();
                self.gains = request.gains();
            }
            CommandMessage::Connect | CommandMessage::Heartbeat => {}
        }
    }
}

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let running = install_ctrlc_handler()?;

    let listener = RigListener::bind(&args.bind)
        .map_err(|err| session_error("bind failed", err))?
        .with_handshake_config(HandshakeConfig {
            await_ack: args.ack,
            ..HandshakeConfig::default()
        });
    println!("listening on {}", listener.local_addr());

    let mut rig = SimulatedRig::new(args.temperature, args.setpoint);

    while running.load(Ordering::SeqCst) {
        let mut link = match listener.accept() {
            Ok(link) => link,
            Err(err @ SessionError::Transport(_)) => {
                return Err(session_error("accept failed", err));
            }
            Err(err) => {
                warn!(error = %err, "console handshake failed");
                continue;
            }
        };
        info!(link = link.id(), peer = link.peer(), "console connected");

        let sent = serve(&mut link, &mut rig, &args, interval, || {
            running.load(Ordering::SeqCst)
        })?;
        link.close();
        info!(link = link.id(), sent, "console session ended");

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

/// Stream to one console until it leaves, the limit is hit or Ctrl-C.
fn serve(
    link: &mut RigLink,
    rig: &mut SimulatedRig,
    args: &SimulateArgs,
    interval: Duration,
    keep_running: impl Fn() -> bool,
) -> CliResult<u64> {
    let mut sent = 0u64;
    let mut next_sample = Instant::now();

    while keep_running() {
        let wait = next_sample.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            match link.recv_commands(wait) {
                Ok(commands) => commands.iter().for_each(|command| rig.apply(command)),
                Err(err) if err.is_connection_lost() => return Ok(sent),
                Err(err) => return Err(session_error("receive failed", err)),
            }
            continue;
        }

        rig.advance(interval);
        let sample = rig
            .sample()
            .map_err(|err| message_error("simulated sample invalid", err))?;
        if let Err(err) = link.send_sample(&sample) {
            info!(error = %err, "console went away");
            return Ok(sent);
        }
        sent += 1;

        if args.heartbeat_every > 0 && sent % u64::from(args.heartbeat_every) == 0 {
            if let Err(err) = link.send_heartbeat() {
                info!(error = %err, "console went away");
                return Ok(sent);
            }
        }
        if args.limit.is_some_and(|limit| sent >= limit) {
            info!(sent, "sample limit reached; closing console link");
            return Ok(sent);
        }
        next_sample += interval;
    }
    Ok(sent)
}
