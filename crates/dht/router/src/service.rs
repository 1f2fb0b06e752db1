//! The router's event loop.

use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace};

use crate::{Event, MessageRouter};

/// Drives a [`MessageRouter`] from a channel of [`Event`]s and runs the
/// FIND-PEER timer.
///
/// The timer is armed by the first connection, fires right away, and is
/// disarmed again when the last neighbour disconnects.
#[derive(Debug)]
pub struct RouterService {
    router: MessageRouter,
    events: mpsc::Receiver<Event>,
    next_find_peer: Option<Instant>,
}

impl RouterService {
    pub fn new(router: MessageRouter, events: mpsc::Receiver<Event>) -> Self {
        Self {
            router,
            events,
            next_find_peer: None,
        }
    }

    /// Create a service and the sender feeding it, buffering up to
    /// `capacity` events.
    pub fn channel(router: MessageRouter, capacity: usize) -> (mpsc::Sender<Event>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(router, rx))
    }

    pub const fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Process events until every sender is dropped, then hand the router
    /// back.
    pub async fn run(mut self) -> MessageRouter {
        info!(local = %self.router.local(), "DHT router started");
        loop {
            let deadline = self.next_find_peer;
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let delay = self.router.find_peer_round();
                    self.next_find_peer = Some(Instant::now() + delay);
                }
            }
        }
        info!(stats = ?self.router.stats(), "DHT router stopped");
        self.router
    }

    fn handle(&mut self, event: Event) {
        let connection_change = matches!(event, Event::Connected(..) | Event::Disconnected(_));
        if let Err(err) = self.router.dispatch(event) {
            // violations are logged where they are detected
            if !err.is_violation() {
                debug!(%err, "event not handled");
            }
        }
        if !connection_change {
            return;
        }

        let empty = self.router.table().is_empty();
        match (self.next_find_peer, empty) {
            (None, false) => {
                trace!("first neighbour, arming FIND-PEER timer");
                self.next_find_peer = Some(Instant::now());
            }
            (Some(_), true) => {
                trace!("no neighbours left, disarming FIND-PEER timer");
                self.next_find_peer = None;
            }
            _ => {}
        }
    }
}
