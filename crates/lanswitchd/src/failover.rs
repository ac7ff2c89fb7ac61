//! Failover state machine.
//!
//! ```text
//!            N degraded cycles, cooldown elapsed
//!   PRIMARY ------------------------------------> SECONDARY
//!      ^                                             |
//!      +---------------------------------------------+
//!            M healthy cycles, cooldown elapsed
//! ```
//!
//! A transition is only committed after [`IpSwapper::swap`] succeeds. A
//! failed swap leaves the active address, the streak counters and the
//! cooldown clock untouched, so the same transition is retried on the next
//! cycle.

use crate::config::LanSwitchConfig;
use crate::error::SwapError;
use crate::net::{AddressManager, ArpAnnouncer};
use crate::swap::{IpSwapper, SwapOutcome};
use crate::types::{ActiveIp, FailoverState, HealthVerdict};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Debounce and rate-limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Consecutive degraded cycles before leaving primary
    pub down_cycles: u32,
    /// Consecutive healthy cycles before returning to primary
    pub up_cycles: u32,
    /// Minimum time between transitions, also applied after startup
    pub cooldown: Duration,
    /// Consecutive failed swaps per fatal alert
    pub swap_failure_alert_threshold: u32,
}

impl FailoverPolicy {
    pub fn from_config(config: &LanSwitchConfig) -> Self {
        Self {
            down_cycles: config.failover.down_cycles,
            up_cycles: config.failover.up_cycles,
            cooldown: config.cooldown(),
            swap_failure_alert_threshold: config.failover.swap_failure_alert_threshold,
        }
    }
}

/// What the machine wants to do after recording a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Stay,
    /// Debounce satisfied but the cooldown has not elapsed
    Wait { target: ActiveIp, remaining: Duration },
    Transition { from: ActiveIp, to: ActiveIp },
}

/// Result of one [`FailoverStateMachine::on_verdict`] call.
#[derive(Debug)]
pub enum CycleOutcome {
    Steady,
    CoolingDown {
        target: ActiveIp,
        remaining: Duration,
    },
    Transitioned {
        from: ActiveIp,
        to: ActiveIp,
        outcome: SwapOutcome,
    },
    SwapFailed {
        from: ActiveIp,
        to: ActiveIp,
        error: SwapError,
        consecutive_failures: u32,
        /// The failure count reached a multiple of the alert threshold
        escalated: bool,
    },
}

impl CycleOutcome {
    pub fn is_transition(&self) -> bool {
        matches!(self, CycleOutcome::Transitioned { .. })
    }
}

#[derive(Debug)]
pub struct FailoverStateMachine {
    policy: FailoverPolicy,
    state: FailoverState,
    consecutive_swap_failures: u32,
}

impl FailoverStateMachine {
    /// Starts on primary with the cooldown clock set to `now`.
    pub fn new(policy: FailoverPolicy, now: Instant) -> Self {
        Self {
            policy,
            state: FailoverState::initial(now),
            consecutive_swap_failures: 0,
        }
    }

    pub fn state(&self) -> &FailoverState {
        &self.state
    }

    pub fn active(&self) -> ActiveIp {
        self.state.active
    }

    /// Failed swaps since the last commit or since the transition stopped
    /// being wanted.
    pub fn consecutive_swap_failures(&self) -> u32 {
        self.consecutive_swap_failures
    }

    /// Updates the streak counters. A verdict resets the opposite counter.
    pub fn record(&mut self, verdict: HealthVerdict) {
        match verdict {
            HealthVerdict::Degraded => {
                self.state.consecutive_degraded_cycles =
                    self.state.consecutive_degraded_cycles.saturating_add(1);
                self.state.consecutive_healthy_cycles = 0;
            }
            HealthVerdict::Healthy => {
                self.state.consecutive_healthy_cycles =
                    self.state.consecutive_healthy_cycles.saturating_add(1);
                self.state.consecutive_degraded_cycles = 0;
            }
        }
    }

    /// Decides from the current counters without changing anything.
    pub fn decide(&self, now: Instant) -> Decision {
        let active = self.state.active;
        let (streak, needed) = match active {
            ActiveIp::Primary => (self.state.consecutive_degraded_cycles, self.policy.down_cycles),
            ActiveIp::Secondary => (self.state.consecutive_healthy_cycles, self.policy.up_cycles),
        };
        if streak < needed {
            return Decision::Stay;
        }

        let target = active.other();
        let elapsed = now.saturating_duration_since(self.state.last_transition_at);
        if elapsed < self.policy.cooldown {
            return Decision::Wait {
                target,
                remaining: self.policy.cooldown - elapsed,
            };
        }

        Decision::Transition {
            from: active,
            to: target,
        }
    }

    fn commit(&mut self, to: ActiveIp, now: Instant) {
        self.state.active = to;
        self.state.last_transition_at = now;
        self.state.consecutive_degraded_cycles = 0;
        self.state.consecutive_healthy_cycles = 0;
        self.consecutive_swap_failures = 0;
    }

    /// Records `verdict` and performs the resulting transition, if any.
    pub async fn on_verdict<N>(
        &mut self,
        verdict: HealthVerdict,
        now: Instant,
        swapper: &IpSwapper<N>,
    ) -> CycleOutcome
    where
        N: AddressManager + ArpAnnouncer,
    {
        self.record(verdict);

        match self.decide(now) {
            Decision::Stay => {
                if self.consecutive_swap_failures > 0 {
                    info!(
                        active = %self.state.active,
                        failures = self.consecutive_swap_failures,
                        "Pending transition no longer wanted"
                    );
                    self.consecutive_swap_failures = 0;
                }
                CycleOutcome::Steady
            }
            Decision::Wait { target, remaining } => {
                debug!(
                    active = %self.state.active,
                    target = %target,
                    remaining_secs = remaining.as_secs_f64(),
                    "Transition deferred by cooldown"
                );
                CycleOutcome::CoolingDown { target, remaining }
            }
            Decision::Transition { from, to } => {
                match to {
                    ActiveIp::Secondary => warn!(
                        degraded_cycles = self.state.consecutive_degraded_cycles,
                        "Failover: switching to secondary address"
                    ),
                    ActiveIp::Primary => info!(
                        healthy_cycles = self.state.consecutive_healthy_cycles,
                        "Recovery: switching back to primary address"
                    ),
                }

                match swapper.swap(from, to).await {
                    Ok(outcome) => {
                        self.commit(to, now);
                        info!(active = %to, ?outcome, "Transition committed");
                        CycleOutcome::Transitioned { from, to, outcome }
                    }
                    Err(error) => {
                        self.consecutive_swap_failures =
                            self.consecutive_swap_failures.saturating_add(1);
                        let failures = self.consecutive_swap_failures;
                        error!(
                            from = %from,
                            to = %to,
                            step = %error.step,
                            failures,
                            "Address swap failed: {}",
                            error
                        );
                        let threshold = self.policy.swap_failure_alert_threshold.max(1);
                        let escalated = failures % threshold == 0;
                        if escalated {
                            error!(
                                alert = "fatal",
                                failures,
                                permission_denied = error.is_permission_denied(),
                                "Address swap keeps failing; manual intervention required"
                            );
                        }
                        CycleOutcome::SwapFailed {
                            from,
                            to,
                            error,
                            consecutive_failures: failures,
                            escalated,
                        }
                    }
                }
            }
        }
    }
}
