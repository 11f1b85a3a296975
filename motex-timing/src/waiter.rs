use crate::delay::Cancelled;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Observable state of the most recent wait on a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Idle,
    Pending,
    Resolved(Duration),
    Cancelled,
}

enum Slot {
    Idle,
    Pending {
        id: u64,
        epoch: Instant,
        tx: oneshot::Sender<Duration>,
    },
    Resolved(Duration),
    Cancelled,
}

/// Single-slot rendezvous between one discrete input signal and at most one
/// awaiting stage.
///
/// Starting a wait supersedes the pending one (which resolves as cancelled),
/// and a fire only ever reaches the most recent registrant. Every transition
/// out of `Pending` happens under the slot lock, so a wait is fulfilled or
/// cancelled exactly once.
pub struct EventWaiter {
    name: &'static str,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl EventWaiter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot::Idle),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a new wait with the current time as its epoch.
    ///
    /// With an already-cancelled token nothing is registered and the returned
    /// wait resolves as cancelled.
    pub fn begin_wait(&self, cancel: &CancellationToken) -> PendingWait<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if cancel.is_cancelled() {
            return PendingWait {
                waiter: self,
                id,
                rx: None,
                cancel: cancel.clone(),
            };
        }

        let (tx, rx) = oneshot::channel();
        let previous = std::mem::replace(
            &mut *self.lock(),
            Slot::Pending {
                id,
                epoch: Instant::now(),
                tx,
            },
        );
        if let Slot::Pending { id: old, .. } = previous {
            // dropping the old sender resolves that wait as cancelled
            tracing::debug!(signal = self.name, superseded = old, "pending wait replaced");
        }

        PendingWait {
            waiter: self,
            id,
            rx: Some(rx),
            cancel: cancel.clone(),
        }
    }

    /// Resolves the pending wait with the time elapsed since it began.
    ///
    /// Returns whether a waiter was fulfilled; without one this is a no-op.
    pub fn fire(&self) -> bool {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Pending { id, epoch, tx } => {
                let elapsed = epoch.elapsed();
                match tx.send(elapsed) {
                    Ok(()) => {
                        tracing::trace!(signal = self.name, id, ?elapsed, "wait fulfilled");
                        *slot = Slot::Resolved(elapsed);
                        true
                    }
                    Err(_) => {
                        *slot = Slot::Cancelled;
                        false
                    }
                }
            }
            other => {
                *slot = other;
                false
            }
        }
    }

    pub fn state(&self) -> WaiterState {
        match &*self.lock() {
            Slot::Idle => WaiterState::Idle,
            Slot::Pending { .. } => WaiterState::Pending,
            Slot::Resolved(d) => WaiterState::Resolved(*d),
            Slot::Cancelled => WaiterState::Cancelled,
        }
    }

    /// Epoch of the pending wait, if any.
    pub fn pending_since(&self) -> Option<Instant> {
        match &*self.lock() {
            Slot::Pending { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }

    fn withdraw(&self, id: u64) {
        let mut slot = self.lock();
        if matches!(&*slot, Slot::Pending { id: current, .. } if *current == id) {
            *slot = Slot::Cancelled;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWaiter")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// A registered wait. Dropping it unresolved withdraws the registration.
pub struct PendingWait<'a> {
    waiter: &'a EventWaiter,
    id: u64,
    rx: Option<oneshot::Receiver<Duration>>,
    cancel: CancellationToken,
}

impl PendingWait<'_> {
    /// Elapsed time between `begin_wait` and the fire, or `Cancelled` when the
    /// token fired or a newer wait superseded this one.
    pub async fn resolve(mut self) -> Result<Duration, Cancelled> {
        let Some(rx) = self.rx.take() else {
            return Err(Cancelled);
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.waiter.withdraw(self.id);
                Err(Cancelled)
            }
            res = rx => res.map_err(|_| Cancelled),
        }
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        self.waiter.withdraw(self.id);
    }
}

/// The two independent input signals a lesson consumes.
#[derive(Debug)]
pub struct Signals {
    /// Response key.
    pub space: EventWaiter,
    /// Block-boundary continue key.
    pub pause: EventWaiter,
}

impl Signals {
    pub fn new() -> Self {
        Self {
            space: EventWaiter::new("space"),
            pause: EventWaiter::new("pause"),
        }
    }

    pub async fn wait_for_space(&self, cancel: &CancellationToken) -> Result<Duration, Cancelled> {
        self.space.begin_wait(cancel).resolve().await
    }

    pub async fn wait_for_pause(&self, cancel: &CancellationToken) -> Result<Duration, Cancelled> {
        self.pause.begin_wait(cancel).resolve().await
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}
