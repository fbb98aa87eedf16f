use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// What a subscriber learns about a change to the assignment set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    Changed(Event),
    /// Notices were dropped because the subscriber fell behind; treat as "something changed".
    Missed(u64),
}

/// Broadcast hub for assignment-set change notifications.
pub struct NotifyHub {
    sender: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.sender.subscribe(),
        }
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Wait for the next change. `None` once the source has shut down.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        match self.rx.recv().await {
            Ok(event) => Some(ChangeNotice::Changed(event)),
            Err(RecvError::Lagged(n)) => Some(ChangeNotice::Missed(n)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of `recv`; `None` if nothing is pending.
    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        use broadcast::error::TryRecvError;
        match self.rx.try_recv() {
            Ok(event) => Some(ChangeNotice::Changed(event)),
            Err(TryRecvError::Lagged(n)) => Some(ChangeNotice::Missed(n)),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    pub fn unsubscribe(self) {
        drop(self.rx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut sub = hub.subscribe();

        let event = Event::AssignmentDeleted { id: Ulid::new() };
        hub.send(&event);

        assert_eq!(sub.recv().await, Some(ChangeNotice::Changed(event)));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&Event::AssignmentDeleted { id: Ulid::new() });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_releases_receiver() {
        let hub = NotifyHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_missed() {
        let hub = NotifyHub::new();
        let mut sub = hub.subscribe();
        for _ in 0..(CHANNEL_CAPACITY + 10) {
            hub.send(&Event::AssignmentDeleted { id: Ulid::new() });
        }
        assert!(matches!(sub.recv().await, Some(ChangeNotice::Missed(_))));
    }

    #[test]
    fn try_recv_empty() {
        let hub = NotifyHub::new();
        let mut sub = hub.subscribe();
        assert_eq!(sub.try_recv(), None);
    }
}
