//! Real-time fan-out of alert events to connected subscribers.
//!
//! Every [`Room`] that currently has subscribers owns one
//! [`tokio::sync::broadcast`] channel. Publishing never blocks: the event is
//! handed to the room's channel and each receiver gets its own clone.
//!
//! ## Rules
//! - **No replay**: a subscriber only sees events sent after it subscribed.
//! - **Lag handling**: a slow subscriber skips the oldest events it missed
//!   and keeps going.
//! - **Idle rooms**: a room is dropped as soon as its last subscription
//!   ends, or on the next publish if the receivers vanished some other way.

pub mod ws;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace, warn};

use safelink_shared::{RealtimeEvent, Room};

/// Events of one room, in publish order.
pub type EventStream = Pin<Box<dyn Stream<Item = Arc<RealtimeEvent>> + Send>>;

pub trait Broadcaster: Send + Sync {
    /// Fire-and-forget; an event published to a room nobody listens to is
    /// dropped.
    fn publish(&self, room: &Room, event: RealtimeEvent);

    fn subscribe(&self, room: Room) -> EventStream;
}

type Rooms = RwLock<HashMap<Room, broadcast::Sender<Arc<RealtimeEvent>>>>;

/// In-process broadcaster with one broadcast channel per live room.
pub struct RoomBroadcaster {
    capacity: usize,
    rooms: Arc<Rooms>,
}

impl RoomBroadcaster {
    /// The capacity is per room and clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of rooms with a live channel.
    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn subscriber_count(&self, room: &Room) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
            .map_or(0, |tx| tx.receiver_count())
    }
}

fn drop_if_idle(rooms: &mut HashMap<Room, broadcast::Sender<Arc<RealtimeEvent>>>, room: &Room) {
    if rooms.get(room).is_some_and(|tx| tx.receiver_count() == 0) {
        rooms.remove(room);
        debug!(%room, "Removed idle room");
    }
}

/// One receiver on one room. Dropping the last subscription of a room
/// removes the room.
struct Subscription {
    room: Room,
    rx: Option<broadcast::Receiver<Arc<RealtimeEvent>>>,
    rooms: Arc<Rooms>,
}

impl Subscription {
    async fn next(&mut self) -> Option<Arc<RealtimeEvent>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room = %self.room, skipped, "Subscriber lagged, events skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // release the receiver under the write lock so a concurrent subscribe
        // to the same room cannot be lost
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        drop(self.rx.take());
        drop_if_idle(&mut rooms, &self.room);
    }
}

impl Broadcaster for RoomBroadcaster {
    fn publish(&self, room: &Room, event: RealtimeEvent) {
        let delivered = {
            let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
            match rooms.get(room) {
                Some(tx) => tx.send(Arc::new(event)).ok(),
                None => {
                    trace!(%room, "No subscribers, event dropped");
                    return;
                }
            }
        };

        match delivered {
            Some(receivers) => trace!(%room, receivers, "Event published"),
            None => {
                let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
                drop_if_idle(&mut rooms, room);
            }
        }
    }

    fn subscribe(&self, room: Room) -> EventStream {
        let rx = {
            let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
            rooms
                .entry(room.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        let subscription = Subscription {
            room,
            rx: Some(rx),
            rooms: Arc::clone(&self.rooms),
        };

        stream::unfold(subscription, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
        .boxed()
    }
}
