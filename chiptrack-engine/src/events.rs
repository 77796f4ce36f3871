//! Transport notifications and the listener registry

use std::fmt;

/// Notification raised by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Playback position moved (at most once per tick, final position only)
    RowChanged { row: usize, sequence_row: usize },
    /// Playback wrapped to the loop start (song mode) or pattern start
    Looped,
    /// Playback stopped
    Stopped,
}

/// Callback receiving transport events
pub type Listener = Box<dyn FnMut(&TransportEvent)>;

/// Registration token returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered multi-subscriber registry
///
/// Listeners are called in subscription order.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Deliver events to every listener, in order
    pub fn dispatch(&mut self, events: &[TransportEvent]) {
        for event in events {
            for (_, listener) in &mut self.entries {
                listener(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}
