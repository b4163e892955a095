// src/protocol/metrics.rs
//
// Render timing metrics reported by the MCU (`#frametime <us>#`,
// `#animtime <us>#`), converted to milliseconds and averaged over a short window.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static METRIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(frametime|animtime)\s+(\d+)#").expect("metric pattern is valid")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    FrameTime,
    AnimTime,
}

/// Parse a metrics line into its kind and value in milliseconds.
/// Returns `None` for anything that does not match the metrics syntax.
pub fn parse_metric(text: &str) -> Option<(MetricKind, f64)> {
    let caps = METRIC_RE.captures(text)?;
    let kind = match &caps[1] {
        "frametime" => MetricKind::FrameTime,
        _ => MetricKind::AnimTime,
    };
    let micros: u64 = caps[2].parse().ok()?;
    Some((kind, micros as f64 / 1000.0))
}

/// Mean of the most recent `capacity` samples.
#[derive(Clone, Debug)]
pub struct RollingAverage {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        RollingAverage {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Current averages in milliseconds (`None` until the first sample).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub frame_ms: Option<f64>,
    pub anim_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric() {
        assert_eq!(
            parse_metric("#frametime 16667#"),
            Some((MetricKind::FrameTime, 16.667))
        );
        assert_eq!(
            parse_metric("#animtime   2500#"),
            Some((MetricKind::AnimTime, 2.5))
        );
        assert_eq!(parse_metric("#frametime abc#"), None);
        assert_eq!(parse_metric("#frametime 12"), None);
        assert_eq!(parse_metric("frametime 12#"), None);
    }

    #[test]
    fn test_rolling_average_window() {
        let mut avg = RollingAverage::new(3);
        assert_eq!(avg.average(), None);
        avg.push(1.0);
        avg.push(2.0);
        avg.push(3.0);
        assert_eq!(avg.average(), Some(2.0));
        avg.push(10.0);
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.average(), Some(5.0));
    }
}
