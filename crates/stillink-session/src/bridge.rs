//! Serial bridge worker.
//!
//! The bridge owns the serial device exclusively and runs its own loop, so a
//! slow or stuck device never stalls the console. Work arrives on a task
//! queue and parsed device output leaves on a result queue; nothing else is
//! shared.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use stillink_frame::{encode_line, FrameConfig, FrameReader, READ_CHUNK_SIZE};
use stillink_message::{
    format_runtime, parse_device_line, CommandMessage, DeviceMessage, DeviceReading,
};
use stillink_transport::SerialIo;
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;

/// First row of the character display.
pub const DISPLAY_TITLE: &str = "Pissbot V1.0";

/// Width of the character display.
pub const DISPLAY_COLS: usize = 20;

/// One line to write to the device, without delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTask {
    line: String,
}

impl SerialTask {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    pub fn line(&self) -> &str {
        &self.line
    }
}

impl From<CommandMessage> for SerialTask {
    fn from(command: CommandMessage) -> Self {
        Self::new(command.encode())
    }
}

/// What the bridge publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerialResult {
    Reading(DeviceReading),
    /// The device failed and the bridge has stopped.
    Fault { message: String },
}

impl SerialResult {
    /// Text for the 4-row character display, one entry per row, each at most
    /// [`DISPLAY_COLS`] characters.
    pub fn display_lines(&self) -> Vec<String> {
        let rows = match self {
            Self::Reading(reading) => vec![
                DISPLAY_TITLE.to_string(),
                format!("Temp: {:.2}", reading.temperature),
                format!("Setpoint: {:.2}", reading.setpoint),
                format!("Runtime: {}", format_runtime(reading.runtime)),
            ],
            Self::Fault { message } => {
                let mut rows = vec![DISPLAY_TITLE.to_string(), "BRIDGE FAULT".to_string()];
                let chars: Vec<char> = message.chars().collect();
                rows.extend(
                    chars
                        .chunks(DISPLAY_COLS)
                        .take(2)
                        .map(|chunk| chunk.iter().collect::<String>()),
                );
                rows
            }
        };
        rows.into_iter()
            .map(|row| row.chars().take(DISPLAY_COLS).collect())
            .collect()
    }
}

/// Bridge tuning.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sleep between iterations that found nothing to do.
    pub idle_interval: Duration,
    /// Drop whatever the device buffered before the bridge started.
    pub clear_input_on_start: bool,
    pub frame: FrameConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(10),
            clear_input_on_start: true,
            frame: FrameConfig::default(),
        }
    }
}

/// Counters kept by the bridge loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub writes: u64,
    pub lines: u64,
    pub published: u64,
    pub heartbeats: u64,
    pub malformed: u64,
    pub rejected_tasks: u64,
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub wrote: bool,
    pub read: bool,
    pub published: bool,
}

impl StepReport {
    pub fn is_idle(&self) -> bool {
        !(self.wrote || self.read || self.published)
    }
}

/// Why the bridge loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Every task sender was dropped and nothing was left to publish.
    TasksClosed,
    /// The result receiver was dropped.
    ResultsClosed,
    /// The device failed; a [`SerialResult::Fault`] was published.
    Fault(String),
}

/// The bridge loop and its state.
pub struct SerialBridge<D> {
    device: D,
    tasks: Receiver<SerialTask>,
    results: Sender<SerialResult>,
    reader: FrameReader,
    pending: VecDeque<DeviceReading>,
    config: BridgeConfig,
    stats: BridgeStats,
    tasks_open: bool,
    scratch: BytesMut,
}

impl<D: SerialIo> SerialBridge<D> {
    pub fn new(
        device: D,
        tasks: Receiver<SerialTask>,
        results: Sender<SerialResult>,
        config: BridgeConfig,
    ) -> Self {
        let reader = FrameReader::with_config(config.frame.clone());
        Self {
            device,
            tasks,
            results,
            reader,
            pending: VecDeque::new(),
            config,
            stats: BridgeStats::default(),
            tasks_open: true,
            scratch: BytesMut::new(),
        }
    }

    /// One iteration: write at most one task, drain whatever the device has
    /// buffered, publish at most one reading. Never waits on either queue or
    /// on the device.
    pub fn step(&mut self) -> Result<StepReport, BridgeError> {
        let mut report = StepReport::default();

        if self.tasks_open {
            match self.tasks.try_recv() {
                Ok(task) => report.wrote = self.write_task(&task)?,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    debug!("task queue closed");
                    self.tasks_open = false;
                }
            }
        }

        let available = self.device.bytes_available()?;
        if available > 0 {
            let mut chunk = vec![0u8; available.min(READ_CHUNK_SIZE)];
            let read = self.device.read_available(&mut chunk)?;
            if read > 0 {
                report.read = true;
                self.absorb(&chunk[..read]);
            }
        }

        if let Some(reading) = self.pending.pop_front() {
            if self.results.send(SerialResult::Reading(reading)).is_err() {
                return Err(BridgeError::ResultsClosed);
            }
            self.stats.published += 1;
            report.published = true;
        }

        Ok(report)
    }

    /// Run until the device fails or either queue is abandoned.
    pub fn run(mut self) -> BridgeExit {
        if self.config.clear_input_on_start {
            if let Err(err) = self.device.clear_input() {
                return self.fault(err);
            }
        }
        info!("serial bridge running");

        loop {
            match self.step() {
                Ok(report) if report.is_idle() => {
                    if !self.tasks_open && self.pending.is_empty() {
                        info!(stats = ?self.stats, "task queue closed; bridge stopping");
                        return BridgeExit::TasksClosed;
                    }
                    thread::sleep(self.config.idle_interval);
                }
                Ok(_) => {}
                Err(BridgeError::Device(err)) => return self.fault(err),
                Err(err) => {
                    info!(reason = %err, "bridge stopping");
                    return BridgeExit::ResultsClosed;
                }
            }
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    fn write_task(&mut self, task: &SerialTask) -> Result<bool, BridgeError> {
        self.scratch.clear();
        if let Err(err) = encode_line(task.line().as_bytes(), &mut self.scratch) {
            self.stats.rejected_tasks += 1;
            warn!(error = %err, "dropping task that is not a single line");
            return Ok(false);
        }
        self.device.write_line(&self.scratch)?;
        self.stats.writes += 1;
        debug!(line = task.line(), "wrote task to device");
        Ok(true)
    }

    fn absorb(&mut self, chunk: &[u8]) {
        let frames = match self.reader.feed(chunk) {
            Ok(frames) => frames,
            Err(err) => {
                self.stats.malformed += 1;
                warn!(error = %err, "dropping oversized device output");
                return;
            }
        };

        for frame in frames {
            if frame.is_empty() {
                continue;
            }
            self.stats.lines += 1;
            match parse_device_line(frame) {
                Ok(DeviceMessage::Reading(reading)) => self.pending.push_back(reading),
                Ok(DeviceMessage::Heartbeat) => self.stats.heartbeats += 1,
                Err(err) => {
                    self.stats.malformed += 1;
                    warn!(error = %err, "skipping malformed device line");
                }
            }
        }
    }

    fn fault(self, err: io::Error) -> BridgeExit {
        let message = err.to_string();
        error!(error = %message, "serial device failed; bridge stopping");
        let fault = SerialResult::Fault {
            message: message.clone(),
        };
        if self.results.send(fault).is_err() {
            debug!("result queue closed; fault not delivered");
        }
        BridgeExit::Fault(message)
    }
}

/// Console side of a running bridge.
#[derive(Debug)]
pub struct BridgeHandle {
    tasks: Sender<SerialTask>,
    results: Receiver<SerialResult>,
    join: JoinHandle<BridgeExit>,
}

impl BridgeHandle {
    /// Queue a line for the device.
    pub fn send(&self, task: SerialTask) -> Result<(), BridgeError> {
        self.tasks.send(task).map_err(|_| BridgeError::TasksClosed)
    }

    /// Another producer for the task queue.
    pub fn task_sender(&self) -> Sender<SerialTask> {
        self.tasks.clone()
    }

    /// Next result, if one is ready.
    pub fn try_recv(&self) -> Option<SerialResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next result. `None` on timeout or when
    /// the bridge has stopped and everything was consumed.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SerialResult> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// True once the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Close the task queue and wait for the worker.
    ///
    /// Results not yet consumed are discarded.
    pub fn shutdown(self) -> BridgeExit {
        let Self {
            tasks,
            results,
            join,
        } = self;
        drop(tasks);
        drop(results);
        join.join()
            .unwrap_or_else(|_| BridgeExit::Fault("bridge thread panicked".to_string()))
    }
}

/// Start a bridge over `device` on a dedicated thread.
pub fn spawn_bridge<D>(device: D, config: BridgeConfig) -> io::Result<BridgeHandle>
where
    D: SerialIo + 'static,
{
    let (task_tx, task_rx) = mpsc::channel();
    let (result_tx, result_rx) = mpsc::channel();
    let bridge = SerialBridge::new(device, task_rx, result_tx, config);

    let join = thread::Builder::new()
        .name("serial-bridge".to_string())
        .spawn(move || bridge.run())?;

    Ok(BridgeHandle {
        tasks: task_tx,
        results: result_rx,
        join,
    })
}
