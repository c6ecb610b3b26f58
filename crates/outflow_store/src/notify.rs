//! Named-channel change notification.
//!
//! Listeners are zero-argument wake signals. A notification carries no
//! payload: receivers re-read the change log to find out what changed, so a
//! burst of notifications is equivalent to one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked when a channel is notified.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Distributes wake signals to listeners registered on named channels.
///
/// Listeners run synchronously on the notifying thread, after the store has
/// committed and released its own locks. They must not block.
#[derive(Default)]
pub struct ChangeNotifier {
    channels: RwLock<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` on `channel`.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn listen(self: &Arc<Self>, channel: &str, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push((id, listener));

        Subscription {
            notifier: Arc::downgrade(self),
            channel: channel.to_string(),
            id,
            active: true,
        }
    }

    /// Wakes every listener on `channel`.
    pub fn notify(&self, channel: &str) {
        let listeners: Vec<Listener> = match self.channels.read().get(channel) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        for listener in listeners {
            listener();
        }
    }

    /// Returns the number of listeners on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, Vec::len)
    }

    fn remove(&self, channel: &str, id: u64) {
        let mut channels = self.channels.write();
        if let Some(entries) = channels.get_mut(channel) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                channels.remove(channel);
            }
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.read();
        f.debug_struct("ChangeNotifier")
            .field("channels", &channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle also unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    notifier: Weak<ChangeNotifier>,
    channel: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Removes the listener. Once this returns the listener is never called
    /// again by a notification that starts afterwards.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    /// Returns the channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.remove(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}


