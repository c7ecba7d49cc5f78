use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use stillink_message::{format_runtime, CommandMessage, TelemetrySample};
use stillink_session::{SerialResult, SessionSnapshot};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct SampleOutput<'a> {
    runtime: f64,
    runtime_hms: String,
    temperature: f64,
    setpoint: f64,
    element_status: &'a str,
    p: f64,
    i: f64,
    d: f64,
    peer: &'a str,
    timestamp: String,
}

impl<'a> SampleOutput<'a> {
    fn new(sample: &'a TelemetrySample, peer: &'a str) -> Self {
        let gains = sample.gains();
        Self {
            runtime: sample.runtime(),
            runtime_hms: format_runtime(sample.runtime()),
            temperature: sample.temperature(),
            setpoint: sample.setpoint(),
            element_status: sample.element_status(),
            p: gains.p,
            i: gains.i,
            d: gains.d,
            peer,
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_sample(sample: &TelemetrySample, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SampleOutput::new(sample, peer)),
        OutputFormat::Table => {
            let gains = sample.gains();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RUNTIME", "TEMP", "SETPOINT", "ELEMENT", "P", "I", "D"])
                .add_row(vec![
                    format_runtime(sample.runtime()),
                    format!("{:.2}", sample.temperature()),
                    format!("{:.2}", sample.setpoint()),
                    sample.element_status().to_string(),
                    format!("{:.2}", gains.p),
                    format!("{:.2}", gains.i),
                    format!("{:.2}", gains.d),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let gains = sample.gains();
            println!(
                "runtime={} temp={:.2} setpoint={:.2} element={} P={:.2} I={:.2} D={:.2}",
                format_runtime(sample.runtime()),
                sample.temperature(),
                sample.setpoint(),
                sample.element_status(),
                gains.p,
                gains.i,
                gains.d
            );
        }
        OutputFormat::Raw => println!("{}", sample.to_line()),
    }
}

#[derive(Serialize)]
struct TuneOutput<'a> {
    line: String,
    previous_setpoint: f64,
    setpoint: f64,
    p: f64,
    i: f64,
    d: f64,
    peer: &'a str,
}

pub fn print_tune(
    command: &CommandMessage,
    previous: &TelemetrySample,
    peer: &str,
    format: OutputFormat,
) {
    let line = command.encode();
    let CommandMessage::TuneRequest(request) = command else {
        println!("{line}");
        return;
    };
    let gains = request.gains();

    match format {
        OutputFormat::Json => print_json(&TuneOutput {
            line,
            previous_setpoint: previous.setpoint(),
            setpoint: request.setpoint(),
            p: gains.p,
            i: gains.i,
            d: gains.d,
            peer,
        }),
        OutputFormat::Table => {
            let before = previous.gains();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "BEFORE", "SENT"])
                .add_row(vec![
                    "setpoint".to_string(),
                    previous.setpoint().to_string(),
                    request.setpoint().to_string(),
                ])
                .add_row(gain_row("P", before.p, gains.p))
                .add_row(gain_row("I", before.i, gains.i))
                .add_row(gain_row("D", before.d, gains.d));
            println!("{table}");
        }
        OutputFormat::Pretty => println!("sent to {peer}: {line}"),
        OutputFormat::Raw => println!("{line}"),
    }
}

fn gain_row(name: &str, before: f64, sent: f64) -> Vec<String> {
    vec![name.to_string(), format!("{before:.2}"), format!("{sent:.2}")]
}

pub fn print_bridge_result(result: &SerialResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROW", "DISPLAY"]);
            for (row, text) in result.display_lines().into_iter().enumerate() {
                table.add_row(vec![row.to_string(), text]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", result.display_lines().join(" | ")),
        OutputFormat::Raw => {
            for line in result.display_lines() {
                println!("{line}");
            }
        }
    }
}

pub fn print_snapshot(snapshot: &SessionSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(snapshot),
        OutputFormat::Table => {
            let stats = &snapshot.stats;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "STATE",
                    "PEER",
                    "SAMPLES",
                    "HEARTBEATS",
                    "MALFORMED",
                    "TIMEOUTS",
                ])
                .add_row(vec![
                    snapshot.state.to_string(),
                    snapshot.peer.clone().unwrap_or_else(|| "-".to_string()),
                    stats.samples.to_string(),
                    stats.heartbeats.to_string(),
                    stats.malformed.to_string(),
                    stats.timeouts.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            let stats = &snapshot.stats;
            println!(
                "state={} samples={} heartbeats={} malformed={} timeouts={}",
                snapshot.state, stats.samples, stats.heartbeats, stats.malformed, stats.timeouts
            );
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
