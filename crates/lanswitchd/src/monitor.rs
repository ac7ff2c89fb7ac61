//! Monitoring loop.
//!
//! Each cycle probes connectivity, samples throughput, evaluates health and
//! feeds the verdict to the failover state machine. Cycles never overlap;
//! cancellation is honored between cycles so an in-flight swap always
//! completes.

use crate::config::LanSwitchConfig;
use crate::error::{ConfigError, Result, SwapError};
use crate::failover::{CycleOutcome, FailoverPolicy, FailoverStateMachine};
use crate::health::{HealthAssessment, HealthEvaluator};
use crate::lifecycle::SystemdNotifier;
use crate::net::NetworkOps;
use crate::probe::ProbeExecutor;
use crate::swap::{IpSwapper, ReconcileAction, SwapSettings};
use crate::types::{ActiveIp, FailoverState, LinkState};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything observed and done during one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub assessment: HealthAssessment,
    pub outcome: CycleOutcome,
}

pub struct Monitor<N: NetworkOps> {
    config: Arc<LanSwitchConfig>,
    probes: ProbeExecutor<N>,
    evaluator: HealthEvaluator,
    machine: FailoverStateMachine,
    swapper: IpSwapper<N>,
    notifier: SystemdNotifier,
    cycle: u64,
    last_sanity_check: Instant,
    needs_reconcile: bool,
}

impl<N: NetworkOps> Monitor<N> {
    /// Prepares the interface and builds the loop.
    ///
    /// Fails if the interface does not exist. A link that is down is brought
    /// up, and the interface is converged onto the primary address. A failed
    /// convergence is retried at the start of the first cycle.
    pub async fn startup(config: Arc<LanSwitchConfig>, net: Arc<N>) -> Result<Self> {
        let interface = config.interface.name.clone();

        match net.link_state(&interface).await? {
            LinkState::Missing => return Err(ConfigError::InterfaceNotFound(interface).into()),
            LinkState::Down => {
                warn!(interface = %interface, "Interface is down, bringing it up");
                if let Err(e) = net.set_link_up(&interface).await {
                    error!(interface = %interface, error = %e, "Cannot bring interface up");
                }
            }
            LinkState::Up => {}
        }

        let pair = config.addresses();
        let swapper = IpSwapper::new(
            Arc::clone(&net),
            interface.clone(),
            pair,
            SwapSettings {
                order: config.swap.order,
                settle: config.settle_delay(),
                arp_count: config.swap.arp_count,
            },
        );

        let needs_reconcile = match swapper.reconcile(ActiveIp::Primary).await {
            Ok(action) => {
                info!(interface = %interface, ?action, "Startup address check complete");
                false
            }
            Err(e) => {
                error!(interface = %interface, "Startup address check failed: {}", e);
                true
            }
        };

        let probes = ProbeExecutor::new(net, config.sample_window(), config.probe.counter);
        let evaluator =
            HealthEvaluator::new(config.probe.failure_ratio, config.health.speed_threshold_mbps);
        let now = Instant::now();
        let machine = FailoverStateMachine::new(FailoverPolicy::from_config(&config), now);

        warn!(
            interface = %interface,
            primary = %pair.primary,
            secondary = %pair.secondary,
            down_cycles = config.failover.down_cycles,
            up_cycles = config.failover.up_cycles,
            cooldown_secs = config.failover.cooldown_secs,
            speed_threshold_mbps = config.health.speed_threshold_mbps,
            "lanswitchd monitoring started"
        );

        Ok(Self {
            config,
            probes,
            evaluator,
            machine,
            swapper,
            notifier: SystemdNotifier::new(),
            cycle: 0,
            last_sanity_check: now,
            needs_reconcile,
        })
    }

    pub fn state(&self) -> &FailoverState {
        self.machine.state()
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn consecutive_swap_failures(&self) -> u32 {
        self.machine.consecutive_swap_failures()
    }

    /// A handle that can restore the primary address independently of the loop.
    pub fn swapper(&self) -> IpSwapper<N> {
        self.swapper.clone()
    }

    pub fn notifier(&self) -> &SystemdNotifier {
        &self.notifier
    }

    /// Runs one complete monitoring cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;

        if self.sanity_check_due() {
            self.sanity_check().await;
        }

        let results = self
            .probes
            .run_probes(&self.config.probe.targets, self.config.probe_timeout())
            .await;
        let sample = self
            .probes
            .sample_throughput(&self.config.interface.name)
            .await;
        let assessment = self.evaluator.assess(&results, &sample);

        debug!(
            cycle = self.cycle,
            verdict = %assessment.verdict,
            failed = assessment.failed,
            total = assessment.total,
            mbps = ?assessment.mbps,
            active = %self.machine.active(),
            "Cycle evaluated"
        );

        let outcome = self
            .machine
            .on_verdict(assessment.verdict, Instant::now(), &self.swapper)
            .await;

        match &outcome {
            CycleOutcome::Transitioned { to, .. } => {
                self.last_sanity_check = Instant::now();
                self.needs_reconcile = false;
                self.report_status(&format!("active address: {}", to));
            }
            CycleOutcome::SwapFailed { .. } => {
                // The interface may be half-changed; converge it back onto
                // the address the state machine still considers active.
                if let Err(e) = self.reconcile_active().await {
                    error!("Cleanup after failed swap did not complete: {}", e);
                    self.needs_reconcile = true;
                }
            }
            CycleOutcome::Steady | CycleOutcome::CoolingDown { .. } => {}
        }

        let every = self.config.logging.summary_every;
        if every > 0 && self.cycle % every == 0 {
            let state = self.machine.state();
            info!(
                cycle = self.cycle,
                active = %state.active,
                degraded_cycles = state.consecutive_degraded_cycles,
                healthy_cycles = state.consecutive_healthy_cycles,
                reachable = assessment.total - assessment.failed,
                total = assessment.total,
                mbps = ?assessment.mbps,
                "Status"
            );
        }

        if let Err(e) = self.notifier.notify_watchdog() {
            debug!(error = %e, "Watchdog notification failed");
        }

        CycleReport {
            cycle: self.cycle,
            assessment,
            outcome,
        }
    }

    /// Runs cycles at the configured interval until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Err(e) = self.notifier.notify_ready() {
            warn!(error = %e, "READY notification failed");
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(cycles = self.cycle, "Monitoring loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        self
    }

    fn sanity_check_due(&self) -> bool {
        if self.needs_reconcile {
            return true;
        }
        match self.config.sanity_check_period() {
            Some(period) => self.last_sanity_check.elapsed() >= period,
            None => false,
        }
    }

    async fn sanity_check(&mut self) {
        self.last_sanity_check = Instant::now();
        match self.reconcile_active().await {
            Ok(ReconcileAction::InSync) => {
                self.needs_reconcile = false;
            }
            Ok(action) => {
                warn!(active = %self.machine.active(), ?action, "Interface addresses repaired");
                self.needs_reconcile = false;
            }
            Err(e) => {
                error!("Address sanity check failed: {}", e);
                self.needs_reconcile = true;
            }
        }
    }

    async fn reconcile_active(&self) -> std::result::Result<ReconcileAction, SwapError> {
        self.swapper.reconcile(self.machine.active()).await
    }

    fn report_status(&self, status: &str) {
        if let Err(e) = self.notifier.notify_status(status) {
            debug!(error = %e, "Status notification failed");
        }
    }
}

/// Restores the primary address when the daemon stops.
///
/// Owns a swapper handle independent of the [`Monitor`], so the restore
/// runs even if the monitoring task panicked.
pub struct ManagedInterface<N> {
    swapper: Option<IpSwapper<N>>,
}

impl<N> ManagedInterface<N>
where
    N: NetworkOps,
{
    pub fn new(swapper: IpSwapper<N>) -> Self {
        Self {
            swapper: Some(swapper),
        }
    }

    /// Converges the interface back onto its primary address.
    pub async fn release(mut self) -> std::result::Result<ReconcileAction, SwapError> {
        let Some(swapper) = self.swapper.take() else {
            return Ok(ReconcileAction::InSync);
        };
        info!(interface = %swapper.interface(), "Restoring primary address");
        let result = swapper.reconcile(ActiveIp::Primary).await;
        match &result {
            Ok(action) => info!(interface = %swapper.interface(), ?action, "Primary address restored"),
            Err(e) => error!(interface = %swapper.interface(), "Cannot restore primary address: {}", e),
        }
        result
    }
}

impl<N> Drop for ManagedInterface<N> {
    fn drop(&mut self) {
        if let Some(swapper) = &self.swapper {
            error!(
                interface = %swapper.interface(),
                "Exiting without restoring the primary address"
            );
        }
    }
}
