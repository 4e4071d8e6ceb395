use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::event::PowerState;

/// Write side of the battery side-channel. Held only by the PowerMonitor.
#[derive(Debug)]
pub struct PowerPublisher {
    state: watch::Sender<PowerState>,
    shutdown_request: CancellationToken,
}

/// Read side, cloned into every monitor that slows down under low battery.
#[derive(Debug, Clone)]
pub struct ThrottleSignal {
    state: watch::Receiver<PowerState>,
}

/// Creates the side-channel. The token is the shutdown request handed to the
/// top-level controller; it fires once battery reaches Critical.
pub fn power_channel() -> (PowerPublisher, ThrottleSignal, CancellationToken) {
    let (tx, rx) = watch::channel(PowerState::Normal);
    let shutdown_request = CancellationToken::new();
    (
        PowerPublisher { state: tx, shutdown_request: shutdown_request.clone() },
        ThrottleSignal { state: rx },
        shutdown_request,
    )
}

impl PowerPublisher {
    pub fn publish(&self, state: PowerState) {
        // send_replace keeps working with zero receivers.
        self.state.send_replace(state);
        if state == PowerState::Critical {
            self.shutdown_request.cancel();
        }
    }

    pub fn subscribe(&self) -> ThrottleSignal {
        ThrottleSignal { state: self.state.subscribe() }
    }
}

impl ThrottleSignal {
    /// A signal stuck at Normal, for monitors run without a PowerMonitor.
    pub fn unthrottled() -> Self {
        let (_tx, rx) = watch::channel(PowerState::Normal);
        Self { state: rx }
    }

    pub fn state(&self) -> PowerState {
        *self.state.borrow()
    }

    pub fn is_throttled(&self) -> bool {
        self.state() != PowerState::Normal
    }
}
