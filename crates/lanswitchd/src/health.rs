//! Health evaluation with dual validation.
//!
//! A cycle is DEGRADED only when both signals agree:
//! - connectivity: the fraction of failed probes reaches `failure_ratio`
//! - throughput: the interface moved less than `speed_threshold_mbps`
//!
//! Either signal alone is treated as a false positive (filtered ICMP on a
//! busy link, or an idle but reachable link).

use crate::types::{HealthVerdict, ProbeResult, ThroughputSample};
use tracing::debug;

/// Detailed result of one evaluation, for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthAssessment {
    pub verdict: HealthVerdict,
    pub failed: usize,
    pub total: usize,
    pub mbps: Option<f64>,
    pub connectivity_lost: bool,
    pub throughput_low: bool,
}

impl HealthAssessment {
    /// True when exactly one signal reported trouble.
    pub fn suppressed(&self) -> bool {
        self.connectivity_lost != self.throughput_low
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthEvaluator {
    failure_ratio: f64,
    speed_threshold_mbps: f64,
}

impl HealthEvaluator {
    pub fn new(failure_ratio: f64, speed_threshold_mbps: f64) -> Self {
        Self {
            failure_ratio,
            speed_threshold_mbps,
        }
    }

    /// Connectivity is lost when `failed / total >= failure_ratio`.
    /// An empty result set is no evidence of loss.
    pub fn connectivity_lost(&self, results: &[ProbeResult]) -> bool {
        if results.is_empty() {
            return false;
        }
        let failed = results.iter().filter(|r| !r.success).count();
        failed as f64 / results.len() as f64 >= self.failure_ratio
    }

    /// An unavailable sample counts as low.
    pub fn throughput_low(&self, sample: &ThroughputSample) -> bool {
        match sample.mbps() {
            Some(mbps) => mbps < self.speed_threshold_mbps,
            None => true,
        }
    }

    pub fn assess(&self, results: &[ProbeResult], sample: &ThroughputSample) -> HealthAssessment {
        let connectivity_lost = self.connectivity_lost(results);
        let throughput_low = self.throughput_low(sample);
        let verdict = if connectivity_lost && throughput_low {
            HealthVerdict::Degraded
        } else {
            HealthVerdict::Healthy
        };

        let assessment = HealthAssessment {
            verdict,
            failed: results.iter().filter(|r| !r.success).count(),
            total: results.len(),
            mbps: sample.mbps(),
            connectivity_lost,
            throughput_low,
        };

        if assessment.suppressed() {
            debug!(
                connectivity_lost,
                throughput_low,
                mbps = ?assessment.mbps,
                threshold_mbps = self.speed_threshold_mbps,
                "Single-signal anomaly treated as healthy"
            );
        }

        assessment
    }

    /// Combines probe results and a throughput sample into a verdict.
    pub fn evaluate(&self, results: &[ProbeResult], sample: &ThroughputSample) -> HealthVerdict {
        self.assess(results, sample).verdict
    }
}
