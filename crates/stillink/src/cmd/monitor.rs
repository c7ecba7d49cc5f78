use std::sync::atomic::Ordering;

use stillink_session::{connect_with_config, TelemetryHistory};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, MonitorArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_sample, print_snapshot, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let poll_timeout = parse_duration(&args.poll_timeout)?;
    let config = args.connect.session_config(poll_timeout)?;
    let running = install_ctrlc_handler()?;

    let mut session = connect_with_config(&args.connect.addr, config)
        .map_err(|err| session_error("connect failed", err))?;
    let peer = session.snapshot().peer.unwrap_or_default();

    let mut history = TelemetryHistory::new();
    let mut printed = 0usize;

    'ticks: while running.load(Ordering::SeqCst) {
        let samples = session
            .poll_default()
            .map_err(|err| session_error("monitor stopped", err))?;

        for sample in samples {
            if let Err(err) = history.append(sample) {
                warn!(error = %err, "sample not recorded");
                continue;
            }
            if let Some(latest) = history.latest() {
                print_sample(latest, &peer, format);
            }
            printed += 1;

            if args.count.is_some_and(|count| printed >= count) {
                break 'ticks;
            }
        }
    }

    session.close();
    info!(samples = history.len(), "monitor finished");
    if args.summary {
        print_snapshot(&session.snapshot(), format);
    }
    Ok(SUCCESS)
}
