//! IP swap procedure.
//!
//! Moves the managed interface from one candidate address to the other:
//!
//! 1. add the target address
//! 2. read back and confirm the target is assigned
//! 3. remove the previous address, read back and confirm it is gone
//! 4. send a gratuitous ARP for the target
//!
//! With [`SwapOrder::RemoveFirst`] steps 1-2 and 3 are exchanged. Any failed
//! step aborts the rest and returns a [`SwapError`] naming it. The ARP
//! announcement runs after the address change is complete, so its failure
//! is logged but does not fail the swap.
//!
//! [`IpSwapper::reconcile`] converges an interface in an unexpected state
//! (both addresses, neither, or the wrong one) onto a single expected
//! address; it backs the startup self-heal, the periodic sanity check and
//! the restore-on-exit path.

use crate::error::{NetError, SwapError, SwapStep};
use crate::net::{AddressManager, ArpAnnouncer};
use crate::types::{ActiveIp, AddressPair, Presence};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Order of the add and remove steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapOrder {
    /// Brief dual-address window, never a blank interface
    #[default]
    AddFirst,
    /// Brief blank window, never two addresses; for drivers that misbehave
    /// with two addresses in one subnet
    RemoveFirst,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapSettings {
    pub order: SwapOrder,
    /// Pause after each mutation before the read-back
    pub settle: Duration,
    /// Gratuitous ARP packets per announcement
    pub arp_count: u32,
}

/// Result of a successful [`IpSwapper::swap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The target was already the only address; nothing was changed
    AlreadyActive,
    Swapped,
}

/// What [`IpSwapper::reconcile`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    InSync,
    /// Both addresses were present; the unexpected one was removed
    RemovedStray,
    /// Neither address was present; the expected one was added
    Restored,
    /// Only the other address was present; a full swap was performed
    Swapped,
}

pub struct IpSwapper<N> {
    net: Arc<N>,
    interface: String,
    pair: AddressPair,
    settings: SwapSettings,
}

impl<N> Clone for IpSwapper<N> {
    fn clone(&self) -> Self {
        Self {
            net: Arc::clone(&self.net),
            interface: self.interface.clone(),
            pair: self.pair,
            settings: self.settings,
        }
    }
}

impl<N> IpSwapper<N> {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn addresses(&self) -> AddressPair {
        self.pair
    }
}

impl<N> IpSwapper<N>
where
    N: AddressManager + ArpAnnouncer,
{
    pub fn new(
        net: Arc<N>,
        interface: impl Into<String>,
        pair: AddressPair,
        settings: SwapSettings,
    ) -> Self {
        Self {
            net,
            interface: interface.into(),
            pair,
            settings,
        }
    }

    /// Reads which of the two candidates are assigned right now.
    pub async fn presence(&self) -> Result<Presence, NetError> {
        let listed = self.net.list_addresses(&self.interface).await?;
        Ok(self.pair.presence(&listed))
    }

    /// Moves the interface from `from` to `to`.
    ///
    /// Idempotent: if `to` is already the only candidate assigned, returns
    /// [`SwapOutcome::AlreadyActive`] without touching the interface.
    pub async fn swap(&self, from: ActiveIp, to: ActiveIp) -> Result<SwapOutcome, SwapError> {
        if from == to {
            return match self.reconcile(to).await? {
                ReconcileAction::InSync => Ok(SwapOutcome::AlreadyActive),
                _ => Ok(SwapOutcome::Swapped),
            };
        }

        let presence = self.read_state(from, to).await?;
        if presence.is_only(to) {
            debug!(interface = %self.interface, target = %to, "Swap target already active");
            return Ok(SwapOutcome::AlreadyActive);
        }

        self.run_steps(from, to, presence).await?;
        Ok(SwapOutcome::Swapped)
    }

    /// Makes `expected` the only candidate address on the interface.
    pub async fn reconcile(&self, expected: ActiveIp) -> Result<ReconcileAction, SwapError> {
        let stray = expected.other();
        let presence = self.read_state(stray, expected).await?;

        if presence.is_only(expected) {
            debug!(interface = %self.interface, expected = %expected, "Interface addresses in sync");
            return Ok(ReconcileAction::InSync);
        }

        if presence.both() {
            warn!(
                interface = %self.interface,
                expected = %expected,
                "Both addresses present, removing {}",
                self.pair.get(stray)
            );
            self.remove_verified(stray, expected).await?;
            self.announce(expected).await;
            return Ok(ReconcileAction::RemovedStray);
        }

        if presence.neither() {
            error!(
                interface = %self.interface,
                expected = %expected,
                "Neither address present, restoring {}",
                self.pair.get(expected)
            );
            self.add_verified(stray, expected).await?;
            self.announce(expected).await;
            return Ok(ReconcileAction::Restored);
        }

        warn!(
            interface = %self.interface,
            expected = %expected,
            "Interface holds the {} address, swapping back",
            stray
        );
        self.run_steps(stray, expected, presence).await?;
        Ok(ReconcileAction::Swapped)
    }

    async fn run_steps(
        &self,
        from: ActiveIp,
        to: ActiveIp,
        presence: Presence,
    ) -> Result<(), SwapError> {
        warn!(
            interface = %self.interface,
            from = %self.pair.get(from),
            to = %self.pair.get(to),
            order = ?self.settings.order,
            %presence,
            "Swapping interface address"
        );

        match self.settings.order {
            SwapOrder::AddFirst => {
                if !presence.has(to) {
                    self.add_verified(from, to).await?;
                }
                if presence.has(from) {
                    self.remove_verified(from, to).await?;
                }
            }
            SwapOrder::RemoveFirst => {
                if presence.has(from) {
                    self.remove_verified(from, to).await?;
                }
                if !presence.has(to) {
                    if let Err(e) = self.add_verified(from, to).await {
                        if presence.has(from) {
                            self.roll_back(from).await;
                        }
                        return Err(e);
                    }
                }
            }
        }

        self.announce(to).await;
        info!(
            interface = %self.interface,
            active = %self.pair.get(to),
            "Address swap complete"
        );
        Ok(())
    }

    async fn read_state(&self, from: ActiveIp, to: ActiveIp) -> Result<Presence, SwapError> {
        self.presence().await.map_err(|e| {
            self.error(from, to, SwapStep::ReadState, "cannot list interface addresses")
                .with_source(e)
        })
    }

    async fn add_verified(&self, from: ActiveIp, to: ActiveIp) -> Result<(), SwapError> {
        let target = self.pair.get(to);
        self.net
            .add_address(&self.interface, &target)
            .await
            .map_err(|e| {
                self.error(from, to, SwapStep::AddTarget, format!("cannot add {}", target))
                    .with_source(e)
            })?;

        self.settle().await;

        let presence = self.presence().await.map_err(|e| {
            self.error(from, to, SwapStep::VerifyTarget, "read-back failed")
                .with_source(e)
        })?;
        if !presence.has(to) {
            return Err(self.error(
                from,
                to,
                SwapStep::VerifyTarget,
                format!("{} not present after add", target),
            ));
        }
        Ok(())
    }

    /// Deletes every listed entry for `from`. The kernel only deletes an
    /// address whose prefix length matches, so each entry is removed as
    /// listed rather than as configured.
    async fn remove_verified(&self, from: ActiveIp, to: ActiveIp) -> Result<(), SwapError> {
        let source = self.pair.get(from);
        let listed = self.net.list_addresses(&self.interface).await.map_err(|e| {
            self.error(from, to, SwapStep::RemoveSource, "cannot list interface addresses")
                .with_source(e)
        })?;
        let mut entries = self.pair.matching(from, &listed);
        if entries.is_empty() {
            entries.push(source);
        }

        for entry in &entries {
            if entry.prefix_len() != source.prefix_len() {
                warn!(
                    interface = %self.interface,
                    configured = %source,
                    listed = %entry,
                    "Removing address with a non-configured prefix"
                );
            }
            self.net
                .remove_address(&self.interface, entry)
                .await
                .map_err(|e| {
                    self.error(from, to, SwapStep::RemoveSource, format!("cannot remove {}", entry))
                        .with_source(e)
                })?;
        }

        self.settle().await;

        let presence = self.presence().await.map_err(|e| {
            self.error(from, to, SwapStep::VerifySource, "read-back failed")
                .with_source(e)
        })?;
        if presence.has(from) {
            return Err(self.error(
                from,
                to,
                SwapStep::VerifySource,
                format!("{} still present after remove", source),
            ));
        }
        Ok(())
    }

    /// Puts the previous address back after a remove-first swap could not
    /// add its target.
    async fn roll_back(&self, from: ActiveIp) {
        let addr = self.pair.get(from);
        error!(interface = %self.interface, address = %addr, "Interface left blank, re-adding previous address");
        if let Err(e) = self.net.add_address(&self.interface, &addr).await {
            error!(interface = %self.interface, address = %addr, error = %e, "Rollback failed");
        }
    }

    async fn announce(&self, which: ActiveIp) {
        let addr = self.pair.get(which);
        match self
            .net
            .announce(&self.interface, addr.address(), self.settings.arp_count)
            .await
        {
            Ok(()) => {}
            Err(NetError::Unavailable(tool)) => {
                debug!(interface = %self.interface, tool = %tool, "Skipping gratuitous ARP");
            }
            Err(e) => {
                warn!(interface = %self.interface, ip = %addr.address(), error = %e, "Gratuitous ARP failed (non-critical)");
            }
        }
    }

    async fn settle(&self) {
        if !self.settings.settle.is_zero() {
            tokio::time::sleep(self.settings.settle).await;
        }
    }

    fn error(
        &self,
        from: ActiveIp,
        to: ActiveIp,
        step: SwapStep,
        reason: impl Into<String>,
    ) -> SwapError {
        SwapError::new(
            &self.interface,
            self.pair.get(from),
            self.pair.get(to),
            step,
            reason,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        order: SwapOrder,
    }

    #[test]
    fn test_swap_order_names() {
        let w: Wrapper = toml::from_str("order = \"remove-first\"").unwrap();
        assert_eq!(w.order, SwapOrder::RemoveFirst);
        let w: Wrapper = toml::from_str("order = \"add-first\"").unwrap();
        assert_eq!(w.order, SwapOrder::AddFirst);
        assert!(toml::from_str::<Wrapper>("order = \"sideways\"").is_err());
    }

    #[test]
    fn test_default_order_is_add_first() {
        assert_eq!(SwapOrder::default(), SwapOrder::AddFirst);
    }
}
