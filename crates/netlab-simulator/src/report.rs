//! Derived metrics and the comma-separated result lines printed per run.

use serde::Serialize;
use std::fmt;
use tracing::info;

/// Durations at or below this many seconds yield zero goodput.
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// Received bytes per second of elapsed time, or zero when the elapsed time
/// is at or below `MIN_ELAPSED_SECS` (or NaN).
pub fn goodput(received_bytes: u64, elapsed_secs: f64) -> f64 {
    if !(elapsed_secs > MIN_ELAPSED_SECS) {
        return 0.0;
    }
    received_bytes as f64 / elapsed_secs
}

/// Fraction of sent bytes that arrived. Zero when nothing was sent.
pub fn efficiency(sent_bytes: u64, received_bytes: u64) -> f64 {
    if sent_bytes == 0 {
        return 0.0;
    }
    received_bytes as f64 / sent_bytes as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowMetrics {
    pub goodput_bytes_per_sec: f64,
    pub efficiency: f64,
}

pub fn finalize(sent_bytes: u64, received_bytes: u64, elapsed_secs: f64) -> FlowMetrics {
    let metrics = FlowMetrics {
        goodput_bytes_per_sec: goodput(received_bytes, elapsed_secs),
        efficiency: efficiency(sent_bytes, received_bytes),
    };
    info!(
        sent = sent_bytes,
        received = received_bytes,
        elapsed = elapsed_secs,
        goodput = metrics.goodput_bytes_per_sec,
        efficiency = metrics.efficiency,
        "flow finished"
    );
    metrics
}

/// Ordered `key,value` pairs rendered as one comma-separated line. A tag is
/// a key without a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    fields: Vec<(String, Option<String>)>,
}

impl ReportLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), Some(value.to_string())));
        self
    }

    pub fn tag(mut self, word: impl Into<String>) -> Self {
        self.fields.push((word.into(), None));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, v)| k == key && v.is_some())
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match value {
                Some(value) => write!(f, "{},{}", key, value)?,
                None => f.write_str(key)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_edges() {
        assert_eq!(efficiency(0, 0), 0.0);
        assert_eq!(efficiency(100, 50), 0.5);
        assert_eq!(efficiency(0, 50), 0.0);
        assert_eq!(efficiency(1000, 1000), 1.0);
    }

    #[test]
    fn goodput_over_elapsed_time() {
        assert_eq!(goodput(5000, 10.0), 500.0);
        assert_eq!(goodput(5000, 0.0), 0.0);
        assert_eq!(goodput(5000, 1e-9), 0.0);
        assert!(goodput(5000, 2e-9) > 0.0);
        assert_eq!(goodput(5000, -1.0), 0.0);
        assert_eq!(goodput(5000, f64::NAN), 0.0);
    }

    #[test]
    fn line_renders_pairs_in_order() {
        let line = ReportLine::new()
            .field("tcp", "TcpTahoe")
            .field("flow", 0)
            .field("goodput", 1234.5);
        assert_eq!(line.to_string(), "tcp,TcpTahoe,flow,0,goodput,1234.5");
        assert_eq!(line.get("flow"), Some("0"));
        assert_eq!(line.get("missing"), None);
        assert_eq!(ReportLine::new().to_string(), "");

        let tagged = ReportLine::new().field("load", 0.9).tag("overall").field("goodput", 12);
        assert_eq!(tagged.to_string(), "load,0.9,overall,goodput,12");
        assert_eq!(tagged.get("overall"), None);
    }
}
