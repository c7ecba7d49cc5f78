use std::sync::atomic::Ordering;
use std::time::Duration;

use stillink_session::{spawn_bridge, BridgeConfig, BridgeExit, SerialResult, SerialTask};
use stillink_transport::{SerialConfig, SerialDevice};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, BridgeArgs};
use crate::exit::{
    bridge_error, io_error, transport_error, CliError, CliResult, DEVICE_FAULT, SUCCESS,
};
use crate::output::{print_bridge_result, OutputFormat};

const RESULT_WAIT: Duration = Duration::from_millis(200);

pub fn run(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_interval = parse_duration(&args.idle_interval)?;
    let serial = SerialConfig {
        path: args.device.clone(),
        baud_rate: args.baud,
        ..SerialConfig::default()
    };
    let device = SerialDevice::open(&serial)
        .map_err(|err| transport_error("cannot open serial device", err))?;

    let running = install_ctrlc_handler()?;
    let handle = spawn_bridge(
        device,
        BridgeConfig {
            idle_interval,
            ..BridgeConfig::default()
        },
    )
    .map_err(|err| io_error("cannot start bridge", err))?;

    for line in &args.commands {
        handle
            .send(SerialTask::new(line.as_str()))
            .map_err(|err| bridge_error("cannot queue command", err))?;
    }

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let Some(result) = handle.recv_timeout(RESULT_WAIT) else {
            if handle.is_finished() {
                break;
            }
            continue;
        };

        print_bridge_result(&result, format);
        if let SerialResult::Fault { message } = result {
            handle.shutdown();
            return Err(CliError::new(DEVICE_FAULT, format!("bridge fault: {message}")));
        }

        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    match handle.shutdown() {
        BridgeExit::Fault(message) => {
            Err(CliError::new(DEVICE_FAULT, format!("bridge fault: {message}")))
        }
        exit => {
            info!(?exit, printed, "bridge stopped");
            Ok(SUCCESS)
        }
    }
}
