//! Headless rig for driving protocols under paused tokio time.

use crate::config::ProtocolTimings;
use crate::protocol::Stage;
use motex_scene::{SharedScene, SharedUi, run_physics};
use motex_timing::{CancellationToken, EventWaiter, Signals};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until};

pub struct Rig {
    pub scene: SharedScene,
    pub ui: SharedUi,
    pub signals: Signals,
    pub timings: ProtocolTimings,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            scene: SharedScene::new(true),
            ui: SharedUi::new(),
            signals: Signals::new(),
            timings: ProtocolTimings::default(),
        }
    }

    pub fn stage<'a>(&'a self, cancel: &'a CancellationToken) -> Stage<'a, SharedScene, SharedUi> {
        Stage {
            scene: &self.scene,
            ui: &self.ui,
            signals: &self.signals,
            timings: &self.timings,
            cancel,
        }
    }

    pub fn physics<'a>(&'a self, cancel: &'a CancellationToken) -> impl Future<Output = ()> + 'a {
        run_physics(&self.scene, Duration::from_millis(20), cancel)
    }
}

/// Fires `waiter` exactly `ms` after its next wait begins.
pub async fn press_after(waiter: &EventWaiter, ms: u64) {
    let epoch = loop {
        if let Some(epoch) = waiter.pending_since() {
            break epoch;
        }
        sleep(Duration::from_millis(1)).await;
    };
    sleep_until(epoch + Duration::from_millis(ms)).await;
    assert!(waiter.fire(), "{} wait vanished before the press", waiter.name());
}

pub async fn press_space_after(signals: &Signals, ms: u64) {
    press_after(&signals.space, ms).await;
}

pub async fn press_pause_after(signals: &Signals, ms: u64) {
    press_after(&signals.pause, ms).await;
}
