use stillink_message::TelemetrySample;
use tracing::warn;

use crate::error::HistoryError;

/// Ordered record of the samples received during one session.
///
/// Append-only and unbounded; a session lasts one distillation run.
#[derive(Debug, Clone, Default)]
pub struct TelemetryHistory {
    samples: Vec<TelemetrySample>,
}

impl TelemetryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    ///
    /// A sample whose runtime is earlier than the latest one is rejected and
    /// not stored. Equal runtimes are accepted.
    pub fn append(&mut self, sample: TelemetrySample) -> Result<(), HistoryError> {
        if let Some(latest) = self.samples.last() {
            if sample.runtime() < latest.runtime() {
                warn!(
                    latest = latest.runtime(),
                    got = sample.runtime(),
                    "rejecting out-of-order sample"
                );
                return Err(HistoryError::OutOfOrder {
                    latest: latest.runtime(),
                    got: sample.runtime(),
                });
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.last()
    }

    /// All samples, oldest first.
    pub fn series(&self) -> &[TelemetrySample] {
        &self.samples
    }

    /// The newest `n` samples, oldest first.
    pub fn last_n(&self, n: usize) -> &[TelemetrySample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(runtime, temperature)` points for charting.
    pub fn temperature_series(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.samples.iter().map(|s| (s.runtime(), s.temperature()))
    }

    /// `(runtime, setpoint)` points for charting.
    pub fn setpoint_series(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.samples.iter().map(|s| (s.runtime(), s.setpoint()))
    }
}

#[cfg(test)]
mod tests {
    use stillink_message::PidGains;

    use super::*;

    fn sample(runtime: f64, temperature: f64) -> TelemetrySample {
        TelemetrySample::new(
            temperature,
            78.4,
            runtime,
            "HEATING",
            PidGains::new(28.0, 1.0, 18.0),
        )
        .unwrap()
    }

    #[test]
    fn new_history_is_empty() {
        let history = TelemetryHistory::new();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        assert!(history.series().is_empty());
    }

    #[test]
    fn append_keeps_order_and_latest() {
        let mut history = TelemetryHistory::new();
        for (i, t) in [70.0, 72.5, 75.0].into_iter().enumerate() {
            history.append(sample(i as f64 * 2.0, t)).unwrap();
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().temperature(), 75.0);
        let runtimes: Vec<f64> = history.series().iter().map(|s| s.runtime()).collect();
        assert_eq!(runtimes, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn equal_runtime_is_accepted() {
        let mut history = TelemetryHistory::new();
        history.append(sample(10.0, 70.0)).unwrap();
        history.append(sample(10.0, 70.1)).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn earlier_runtime_is_rejected() {
        let mut history = TelemetryHistory::new();
        history.append(sample(10.0, 70.0)).unwrap();
        let err = history.append(sample(9.5, 71.0)).unwrap_err();
        assert_eq!(
            err,
            HistoryError::OutOfOrder {
                latest: 10.0,
                got: 9.5
            }
        );
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().temperature(), 70.0);
    }

    #[test]
    fn last_n_and_chart_projections() {
        let mut history = TelemetryHistory::new();
        for i in 0..5 {
            history.append(sample(i as f64, 70.0 + i as f64)).unwrap();
        }
        let tail: Vec<f64> = history.last_n(2).iter().map(|s| s.runtime()).collect();
        assert_eq!(tail, vec![3.0, 4.0]);
        assert_eq!(history.last_n(10).len(), 5);

        let temps: Vec<_> = history.temperature_series().collect();
        assert_eq!(temps[4], (4.0, 74.0));
        let setpoints: Vec<_> = history.setpoint_series().collect();
        assert!(setpoints.iter().all(|&(_, sp)| sp == 78.4));
    }
}
