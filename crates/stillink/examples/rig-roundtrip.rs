//! Simulated rig and console in one process.
//!
//! Run with:
//!   cargo run --example rig-roundtrip --features session

use std::thread;
use std::time::Duration;

use stillink::message::{CommandMessage, PidGains, TelemetrySample};
use stillink::session::{connect, RigListener, TelemetryHistory};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = RigListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr().to_string();
    eprintln!("Rig listening on {addr}");

    let rig = thread::spawn(move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut link = listener.accept()?;
        let mut setpoint = 78.4;
        for tick in 0..10 {
            let sample = TelemetrySample::new(
                70.0 + tick as f64 * 0.5,
                setpoint,
                tick as f64,
                "HEATING",
                PidGains::new(28.0, 1.0, 18.0),
            )?;
            link.send_sample(&sample)?;
            for command in link.recv_commands(Duration::from_millis(50))? {
                if let CommandMessage::TuneRequest(request) = command {
                    eprintln!("Rig applying setpoint {}", request.setpoint());
                    setpoint = request.setpoint();
                }
            }
        }
        Ok(())
    });

    let mut session = connect(&addr)?;
    let mut history = TelemetryHistory::new();
    let mut tuned = false;

    while history.len() < 10 {
        let samples = match session.poll(Duration::from_millis(500)) {
            Ok(samples) => samples,
            Err(err) => {
                eprintln!("Session ended: {err}");
                break;
            }
        };
        for sample in samples {
            eprintln!(
                "t={:>4} temp={:.2} setpoint={}",
                sample.runtime(),
                sample.temperature(),
                sample.setpoint()
            );
            history.append(sample)?;
        }

        if !tuned && history.len() >= 3 {
            if let Some(latest) = history.latest() {
                session.send(&CommandMessage::tune(80.0, latest.gains())?)?;
                tuned = true;
            }
        }
    }

    session.close();
    if let Err(err) = rig.join().map_err(|_| "rig thread panicked")? {
        eprintln!("Rig stopped: {err}");
    }
    println!("{:?}", session.snapshot());
    Ok(())
}
