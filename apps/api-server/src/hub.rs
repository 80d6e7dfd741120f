//! In-process chat rooms backed by `tokio::sync::broadcast`.
//!
//! Each room is a broadcast channel created on first use. Frames are
//! serialized once and shared between listeners as `Arc<str>`.
//!
//! A message goes to several rooms at once, so a socket listening in more
//! than one of them filters repeats through `RecentIds`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use domain::chat::Room;
use tokio::sync::broadcast;
use tracing::{debug, trace};

pub type Frame = Arc<str>;

/// A stored message on its way to listeners.
#[derive(Clone, Debug)]
pub struct Relay {
    pub message_id: Arc<str>,
    pub frame: Frame,
}

impl Relay {
    pub fn new(message_id: &str, frame: Frame) -> Self {
        Self {
            message_id: Arc::from(message_id),
            frame,
        }
    }
}

/// Bounded memory of message ids a socket has already forwarded.
pub struct RecentIds {
    order: VecDeque<Arc<str>>,
    seen: HashSet<Arc<str>>,
    capacity: usize,
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`; `false` when it was already recorded.
    pub fn insert(&mut self, id: &Arc<str>) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.order.push_back(Arc::clone(id));
        self.seen.insert(Arc::clone(id));
        true
    }
}

#[derive(Clone)]
pub struct ChatHub {
    rooms: Arc<Mutex<HashMap<String, broadcast::Sender<Relay>>>>,
    capacity: usize,
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, room: &Room) -> broadcast::Receiver<Relay> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room.name())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send `relay` to every listener in `rooms`; returns how many received it.
    ///
    /// Rooms nobody listens to any more are dropped.
    pub fn publish(&self, rooms: &[Room], relay: Relay) -> usize {
        let mut map = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for room in rooms {
            let name = room.name();
            let Some(tx) = map.get(&name) else {
                trace!(room = %name, "no listeners");
                continue;
            };
            match tx.send(relay.clone()) {
                Ok(n) => delivered += n,
                Err(_) => {
                    debug!(room = %name, "room empty, dropping channel");
                    map.remove(&name);
                }
            }
        }
        delivered
    }

    #[cfg(test)]
    fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::chat::rooms_for;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn relay(id: &str, body: &str) -> Relay {
        Relay::new(id, Arc::from(body))
    }

    #[tokio::test]
    async fn listeners_get_frames_for_their_rooms_only() {
        let hub = ChatHub::new(8);
        let mut own = hub.subscribe(&Room::Support("u1".into()));
        let mut other = hub.subscribe(&Room::Support("u2".into()));
        let mut admins = hub.subscribe(&Room::AdminSupport);

        let n = hub.publish(&rooms_for("u1"), relay("m1", "hello"));
        assert_eq!(n, 2);
        assert_eq!(&*own.recv().await.unwrap().frame, "hello");
        assert_eq!(&*admins.recv().await.unwrap().message_id, "m1");
        assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn abandoned_rooms_are_dropped() {
        let hub = ChatHub::new(8);
        let rx = hub.subscribe(&Room::ConsultantRoom);
        assert_eq!(hub.room_count(), 1);
        drop(rx);
        assert_eq!(hub.publish(&[Room::ConsultantRoom], relay("m1", "x")), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn slow_listeners_skip_ahead() {
        let hub = ChatHub::new(2);
        let mut rx = hub.subscribe(&Room::AdminSupport);
        for i in 0..4 {
            hub.publish(&[Room::AdminSupport], relay(&i.to_string(), "x"));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(&*rx.recv().await.unwrap().message_id, "2");
    }

    #[test]
    fn recent_ids_filter_repeats_and_forget_the_oldest() {
        let mut recent = RecentIds::new(2);
        let (a, b, c): (Arc<str>, Arc<str>, Arc<str>) = ("a".into(), "b".into(), "c".into());
        assert!(recent.insert(&a));
        assert!(!recent.insert(&a));
        assert!(recent.insert(&b));
        assert!(recent.insert(&c));
        // `a` was evicted to make room for `c`.
        assert!(recent.insert(&a));
        assert!(!recent.insert(&c));
    }
}
