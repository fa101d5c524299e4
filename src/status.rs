//! Status publisher: fans out the latest `ThermodStatus` to every monitor
//! connection currently waiting. A `tokio::sync::watch` channel already has
//! exactly the semantics asks for — only the latest value matters,
//! a slow or gone subscriber just misses intermediate ones — so this is a
//! thin wrapper rather than a hand-rolled broadcast list.

use crate::timetable::ThermodStatus;
use chrono::Local;
use tokio::sync::watch;

#[derive(Clone)]
pub struct StatusPublisher {
    tx: watch::Sender<ThermodStatus>,
}

impl StatusPublisher {
    pub fn new(initial: ThermodStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        StatusPublisher { tx }
    }

    pub fn placeholder(mode: crate::timetable::Mode) -> Self {
        Self::new(ThermodStatus {
            timestamp: Local::now(),
            mode,
            current_temperature: None,
            target_temperature: None,
            heating_status: 0,
            error: None,
        })
    }

    /// Publishes a new snapshot, waking every `GET /monitor` long-poll that
    /// is currently waiting on `subscribe().changed()`.
    pub fn publish(&self, status: ThermodStatus) {
        // `send` only errors when there are no receivers left, which is
        // fine: there is nobody to wake.
        let _ = self.tx.send(status);
    }

    pub fn latest(&self) -> ThermodStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThermodStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::Mode;

    #[tokio::test]
    async fn subscriber_observes_latest_publication() {
        let publisher = StatusPublisher::placeholder(Mode::Off);
        let mut rx = publisher.subscribe();

        let published = ThermodStatus {
            timestamp: Local::now(),
            mode: Mode::Auto,
            current_temperature: Some(21.0),
            target_temperature: Some(22.0),
            heating_status: 1,
            error: None,
        };
        publisher.publish(published.clone());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), published);
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_latest_not_history() {
        let publisher = StatusPublisher::placeholder(Mode::Off);
        publisher.publish(ThermodStatus {
            timestamp: Local::now(),
            mode: Mode::On,
            current_temperature: Some(10.0),
            target_temperature: None,
            heating_status: 1,
            error: None,
        });
        let second = ThermodStatus {
            timestamp: Local::now(),
            mode: Mode::Off,
            current_temperature: Some(11.0),
            target_temperature: None,
            heating_status: 0,
            error: None,
        };
        publisher.publish(second.clone());

        // A subscriber created after both publications only ever observes
        // the latest value, never the history.
        let rx = publisher.subscribe();
        assert_eq!(*rx.borrow(), second);
    }
}
