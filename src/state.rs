use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Coarse health flags shared by every call made through one client.
///
/// Both flags are observable through [`tokio::sync::watch`] receivers. Writes
/// go through the channel's lock, so concurrent calls never interleave an update.
#[derive(Clone, Debug)]
pub struct ConnectionState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    internet: watch::Sender<bool>,
    in_flight: watch::Sender<bool>,
    active_calls: AtomicUsize,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Starts optimistic: connected, nothing in flight.
    pub fn new() -> Self {
        let (internet, _) = watch::channel(true);
        let (in_flight, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                internet,
                in_flight,
                active_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn has_internet(&self) -> bool {
        *self.inner.internet.borrow()
    }

    /// `true` while at least one API call is running.
    pub fn is_in_flight(&self) -> bool {
        *self.inner.in_flight.borrow()
    }

    pub fn subscribe_internet(&self) -> watch::Receiver<bool> {
        self.inner.internet.subscribe()
    }

    pub fn subscribe_in_flight(&self) -> watch::Receiver<bool> {
        self.inner.in_flight.subscribe()
    }

    pub(crate) fn set_internet(&self, connected: bool) {
        self.inner.internet.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Marks a call as running until the returned guard drops.
    pub(crate) fn begin_call(&self) -> InFlightGuard {
        self.inner.in_flight.send_if_modified(|flag| {
            self.inner.active_calls.fetch_add(1, Ordering::SeqCst);
            let changed = !*flag;
            *flag = true;
            changed
        });
        InFlightGuard {
            state: self.clone(),
        }
    }
}

/// Clears one call's in-flight contribution exactly once, on drop.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    state: ConnectionState,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let inner = &self.state.inner;
        inner.in_flight.send_if_modified(|flag| {
            let remaining = inner.active_calls.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 && *flag {
                *flag = false;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState;

    #[test]
    fn starts_connected_and_idle() {
        let state = ConnectionState::new();
        assert!(state.has_internet());
        assert!(!state.is_in_flight());
    }

    #[test]
    fn in_flight_stays_set_until_last_call_finishes() {
        let state = ConnectionState::new();
        let first = state.begin_call();
        let second = state.begin_call();
        assert!(state.is_in_flight());

        drop(first);
        assert!(state.is_in_flight());

        drop(second);
        assert!(!state.is_in_flight());
    }

    #[tokio::test]
    async fn subscribers_observe_connectivity_changes() {
        let state = ConnectionState::new();
        let mut rx = state.subscribe_internet();

        state.set_internet(false);
        rx.changed().await.expect("sender alive");
        assert!(!*rx.borrow_and_update());

        state.set_internet(false);
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
