//! Probe executor: reachability checks and throughput samples.
//!
//! Neither operation fails the caller. A probe that times out or errors is
//! reported as `success = false`; a counter that cannot be read yields an
//! unavailable [`ThroughputSample`]. No state is kept between calls.

use crate::net::{InterfaceStats, Pinger};
use crate::types::{CounterKind, ProbeResult, ThroughputSample};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct ProbeExecutor<N> {
    net: Arc<N>,
    sample_window: Duration,
    counter: CounterKind,
}

impl<N> ProbeExecutor<N>
where
    N: Pinger + InterfaceStats,
{
    pub fn new(net: Arc<N>, sample_window: Duration, counter: CounterKind) -> Self {
        Self {
            net,
            sample_window,
            counter,
        }
    }

    /// Pings every target concurrently; results keep the order of `targets`.
    pub async fn run_probes(&self, targets: &[String], timeout: Duration) -> Vec<ProbeResult> {
        let probes = targets.iter().map(|target| async move {
            match self.net.ping(target, timeout).await {
                Ok(rtt) => ProbeResult::success(target.as_str(), rtt.as_secs_f64() * 1000.0),
                Err(e) => {
                    debug!(target = %target, error = %e, "Probe failed");
                    ProbeResult::failure(target.as_str())
                }
            }
        });
        let results = join_all(probes).await;

        let ok = results.iter().filter(|r| r.success).count();
        debug!(ok, total = results.len(), "Probe round complete");
        results
    }

    /// Measures throughput as the counter delta over the sample window.
    pub async fn sample_throughput(&self, interface: &str) -> ThroughputSample {
        let start = match self.net.byte_counter(interface, self.counter).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(interface, error = %e, "Cannot read interface counters");
                return ThroughputSample::unavailable(Instant::now());
            }
        };
        let started_at = Instant::now();

        tokio::time::sleep(self.sample_window).await;

        let end = match self.net.byte_counter(interface, self.counter).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(interface, error = %e, "Cannot read interface counters");
                return ThroughputSample::unavailable(Instant::now());
            }
        };
        let measured_at = Instant::now();

        let Some(delta) = end.checked_sub(start) else {
            warn!(interface, start, end, "Interface counter went backwards");
            return ThroughputSample::unavailable(measured_at);
        };

        let mut elapsed = measured_at.duration_since(started_at).as_secs_f64();
        if elapsed <= 0.0 {
            elapsed = self.sample_window.as_secs_f64();
        }
        if elapsed <= 0.0 {
            return ThroughputSample::unavailable(measured_at);
        }

        let sample = ThroughputSample::new(delta as f64 / elapsed, measured_at);
        debug!(
            interface,
            mbps = sample.mbps().unwrap_or_default(),
            "Throughput sample"
        );
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted probe host
    #[derive(Default)]
    struct ScriptedHost {
        reachable: HashMap<String, bool>,
        counters: Mutex<VecDeque<Result<u64, ()>>>,
    }

    #[async_trait]
    impl Pinger for ScriptedHost {
        async fn ping(&self, target: &str, timeout: Duration) -> Result<Duration, ProbeError> {
            if self.reachable.get(target).copied().unwrap_or(false) {
                Ok(Duration::from_millis(15))
            } else {
                Err(ProbeError::Timeout {
                    target: target.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    #[async_trait]
    impl InterfaceStats for ScriptedHost {
        async fn byte_counter(&self, interface: &str, _kind: CounterKind) -> Result<u64, ProbeError> {
            match self.counters.lock().unwrap().pop_front() {
                Some(Ok(v)) => Ok(v),
                _ => Err(ProbeError::Counters {
                    interface: interface.to_string(),
                    detail: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn executor(host: ScriptedHost) -> ProbeExecutor<ScriptedHost> {
        ProbeExecutor::new(Arc::new(host), Duration::from_secs(2), CounterKind::Tx)
    }

    fn targets(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_probe_failures_are_results_not_errors() {
        let mut host = ScriptedHost::default();
        host.reachable.insert("1.1.1.1".to_string(), true);
        let exec = executor(host);

        let results = exec
            .run_probes(&targets(&["8.8.8.8", "1.1.1.1"]), Duration::from_secs(1))
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], ProbeResult::failure("8.8.8.8"));
        assert!(results[1].success);
        assert_eq!(results[1].target, "1.1.1.1");
        assert_eq!(results[1].latency_ms, Some(15.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_from_counter_delta() {
        let host = ScriptedHost::default();
        // 5_000_000 bytes over 2s = 2.5 MB/s = 20 Mbps
        host.counters
            .lock()
            .unwrap()
            .extend([Ok(1_000_000), Ok(6_000_000)]);
        let sample = executor(host).sample_throughput("eth0").await;
        assert_eq!(sample.bytes_per_second, Some(2_500_000.0));
        assert_eq!(sample.mbps(), Some(20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_unreadable_counter() {
        let host = ScriptedHost::default();
        let sample = executor(host).sample_throughput("eth0").await;
        assert!(sample.bytes_per_second.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_counter_reset() {
        let host = ScriptedHost::default();
        host.counters.lock().unwrap().extend([Ok(9_000), Ok(10)]);
        let sample = executor(host).sample_throughput("eth0").await;
        assert!(sample.bytes_per_second.is_none());
    }
}
