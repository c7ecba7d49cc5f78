use std::time::{Duration, Instant};

use stillink_message::{parse_override, TelemetrySample, TuneOverrides};
use stillink_session::{connect_with_config, ConnectionSession};
use tracing::{info, warn};

use crate::cmd::{parse_duration, TuneArgs};
use crate::exit::{message_error, session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_tune, OutputFormat};

const POLL_SLICE: Duration = Duration::from_millis(500);

pub fn run(args: TuneArgs, format: OutputFormat) -> CliResult<i32> {
    let overrides = overrides_from(&args)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.connect.session_config(POLL_SLICE)?;

    let mut session = connect_with_config(&args.connect.addr, config)
        .map_err(|err| session_error("connect failed", err))?;
    let peer = session.snapshot().peer.unwrap_or_default();

    let latest = wait_for_sample(&mut session, wait_timeout)?;
    if overrides.is_empty() {
        warn!("no overrides given; resending current values");
    }
    let command = overrides
        .resolve(&latest)
        .map_err(|err| message_error("invalid tune request", err))?;

    session
        .send(&command)
        .map_err(|err| session_error("send failed", err))?;
    info!(line = %command.encode(), "tune request sent");
    print_tune(&command, &latest, &peer, format);

    session.close();
    Ok(SUCCESS)
}

fn overrides_from(args: &TuneArgs) -> CliResult<TuneOverrides> {
    let field = |input: &Option<String>, name: &'static str| match input {
        Some(input) => {
            parse_override(input, name).map_err(|err| message_error("invalid override", err))
        }
        None => Ok(None),
    };

    Ok(TuneOverrides {
        setpoint: field(&args.setpoint, "setpoint")?,
        p_gain: field(&args.p_gain, "P")?,
        i_gain: field(&args.i_gain, "I")?,
        d_gain: field(&args.d_gain, "D")?,
    })
}

/// Current values come from the rig; nothing is sent until one sample is in.
fn wait_for_sample(
    session: &mut ConnectionSession,
    timeout: Duration,
) -> CliResult<TelemetrySample> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no telemetry received within {timeout:?}"),
            ));
        }

        let samples = session
            .poll(remaining.min(POLL_SLICE))
            .map_err(|err| session_error("waiting for telemetry", err))?;
        if let Some(latest) = samples.into_iter().last() {
            return Ok(latest);
        }
    }
}
