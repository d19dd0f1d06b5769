//! [`LinkMonitor`] – the two-state degradation controller.
//!
//! **Bridge-Primary**: the brain has exchanged successfully with the HTTP
//! bridge within the probe window.  **Autonomous-Fallback**: the window
//! elapsed with no successful exchange; the fallback transport is
//! authoritative and local reactions are live.
//!
//! Each successful bridge exchange calls [`LinkMonitor::touch`]; a probe
//! task evaluates the window on a fixed interval.  The state is published
//! through a watch channel, so a transition fires observers exactly once per
//! episode, and restoring reachability flips back within one probe
//! interval.  Transitions never cancel a command in flight – the executor
//! runs every accepted command to completion regardless of link state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

/// Which transport is authoritative right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    BridgePrimary,
    AutonomousFallback,
}

struct MonitorInner {
    last_contact: Mutex<Instant>,
    state: watch::Sender<LinkState>,
    window: Duration,
    interval: Duration,
}

/// Shared handle onto the degradation state machine.  Clone freely.
#[derive(Clone)]
pub struct LinkMonitor {
    inner: Arc<MonitorInner>,
}

impl LinkMonitor {
    /// `window` is how long the brain may stay silent before fallback;
    /// `interval` is the probe cadence.
    pub fn new(window: Duration, interval: Duration) -> Self {
        let (state, _) = watch::channel(LinkState::BridgePrimary);
        Self {
            inner: Arc::new(MonitorInner {
                last_contact: Mutex::new(Instant::now()),
                state,
                window,
                interval,
            }),
        }
    }

    /// Record a successful exchange with the brain.
    pub fn touch(&self) {
        *self.inner.last_contact.lock().unwrap() = Instant::now();
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        *self.inner.state.borrow()
    }

    /// Watch handle for contexts reacting to transitions.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.inner.state.subscribe()
    }

    /// One probe evaluation.  Driven by [`LinkMonitor::run`] on the probe
    /// interval; exposed so tests can step the machine without a clock.
    pub fn evaluate(&self) {
        let elapsed = self.inner.last_contact.lock().unwrap().elapsed();
        let current = *self.inner.state.borrow();
        match current {
            LinkState::BridgePrimary if elapsed > self.inner.window => {
                warn!(
                    silent_for_ms = elapsed.as_millis() as u64,
                    "bridge path unreachable, switching to autonomous fallback"
                );
                let _ = self.inner.state.send(LinkState::AutonomousFallback);
            }
            LinkState::AutonomousFallback if elapsed <= self.inner.window => {
                info!("bridge path restored, back to primary");
                let _ = self.inner.state.send(LinkState::BridgePrimary);
            }
            _ => {}
        }
    }

    /// Run the probe cadence forever.
    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.inner.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.evaluate();
        }
    }
}
