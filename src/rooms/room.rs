use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{error::DeliveryFailure, event::Event};

/// Sending half of one live client. The receiving half is pumped into the
/// socket by the connection's own task, so a send never waits on the peer.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::Sender<Arc<str>>,
}

impl Connection {
    pub fn open(buffer: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Connection { id: Uuid::now_v7(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, msg: Arc<str>) -> Result<(), DeliveryFailure> {
        self.tx.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Saturated,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Hands out publish tickets and tracks which one may go out next.
struct Sequence {
    issued: AtomicU64,
    serving: watch::Sender<u64>,
    skipped: Mutex<BTreeSet<u64>>,
}

impl Sequence {
    fn new() -> Self {
        Sequence {
            issued: AtomicU64::new(0),
            serving: watch::Sender::new(0),
            skipped: Mutex::new(BTreeSet::new()),
        }
    }

    fn skipped(&self) -> MutexGuard<'_, BTreeSet<u64>> {
        self.skipped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_past(&self, skipped: &mut BTreeSet<u64>, number: u64) {
        let mut next = number + 1;
        while skipped.remove(&next) {
            next += 1;
        }
        self.serving.send_replace(next);
    }

    fn finish(&self, number: u64) {
        let mut skipped = self.skipped();
        self.advance_past(&mut skipped, number);
    }

    fn abandon(&self, number: u64) {
        let mut skipped = self.skipped();
        let serving = *self.serving.borrow();
        if serving == number {
            self.advance_past(&mut skipped, number);
        } else {
            skipped.insert(number);
        }
    }
}

/// A place in the room's publish order, drawn while the group is locked.
/// Dropping it unused gives the place up so later events are not held back.
pub struct Ticket {
    sequence: Arc<Sequence>,
    number: u64,
    used: bool,
}

impl Ticket {
    pub fn number(&self) -> u64 {
        self.number
    }

    async fn turn(&self) {
        let mut serving = self.sequence.serving.subscribe();
        // the sender lives as long as this ticket, so this cannot fail
        let _ = serving.wait_for(|serving| *serving == self.number).await;
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.used {
            self.sequence.abandon(self.number);
        }
    }
}

/// Live connections of one group.
pub struct Room {
    group_id: Uuid,
    connections: Mutex<HashMap<Uuid, Connection>>,
    sequence: Arc<Sequence>,
}

impl Room {
    pub fn new(group_id: Uuid) -> Self {
        Room {
            group_id,
            connections: Mutex::new(HashMap::new()),
            sequence: Arc::new(Sequence::new()),
        }
    }

    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<Uuid, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join(&self, connection: Connection) {
        self.connections().insert(connection.id(), connection);
    }

    /// Returns whether the connection was still present.
    pub fn leave(&self, connection_id: Uuid) -> bool {
        self.connections().remove(&connection_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tickets drawn in commit order make events go out in commit order.
    pub fn ticket(&self) -> Ticket {
        Ticket {
            sequence: self.sequence.clone(),
            number: self.sequence.issued.fetch_add(1, Ordering::Relaxed),
            used: false,
        }
    }

    /// Single best-effort pass. Connections that refuse the message are
    /// dropped once the pass is over.
    pub fn broadcast(&self, msg: Arc<str>) -> Delivery {
        let mut connections = self.connections();

        let mut failed = Vec::new();
        for (id, connection) in connections.iter() {
            if let Err(err) = connection.send(msg.clone()) {
                failed.push((*id, err));
            }
        }

        for (id, err) in &failed {
            tracing::warn!(group_id = %self.group_id, connection = %id, %err, "dropping connection");
            connections.remove(id);
        }

        Delivery {
            delivered: connections.len(),
            dropped: failed.len(),
        }
    }

    /// Waits until every earlier ticket has been published or given up,
    /// then publishes.
    pub async fn publish_in_turn(&self, mut ticket: Ticket, event: &Event) -> Delivery {
        ticket.turn().await;
        let delivery = self.publish(event);
        ticket.used = true;
        self.sequence.finish(ticket.number);
        delivery
    }

    pub fn publish(&self, event: &Event) -> Delivery {
        match event.encode() {
            Ok(msg) => self.broadcast(msg),
            Err(err) => {
                tracing::error!(group_id = %self.group_id, %err, "could not encode event");
                Delivery::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, Payload};

    #[tokio::test]
    async fn fan_out_reaches_everyone() {
        let room = Room::new(Uuid::now_v7());
        let (alice, mut rx1) = Connection::open(4);
        let (bob, mut rx2) = Connection::open(4);
        room.join(alice);
        room.join(bob);

        let delivery = room.broadcast(Arc::from("hello"));
        assert_eq!(delivery, Delivery { delivered: 2, dropped: 0 });
        assert_eq!(&*rx1.recv().await.unwrap(), "hello");
        assert_eq!(&*rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn closed_connections_are_pruned_without_hurting_others() {
        let room = Room::new(Uuid::now_v7());
        let (gone, rx_gone) = Connection::open(4);
        let (alive, mut rx_alive) = Connection::open(4);
        room.join(gone);
        room.join(alive);
        drop(rx_gone);

        let delivery = room.broadcast(Arc::from("one"));
        assert_eq!(delivery, Delivery { delivered: 1, dropped: 1 });
        assert_eq!(room.len(), 1);
        assert_eq!(&*rx_alive.recv().await.unwrap(), "one");

        let delivery = room.broadcast(Arc::from("two"));
        assert_eq!(delivery, Delivery { delivered: 1, dropped: 0 });
    }

    #[tokio::test]
    async fn saturated_connection_is_dropped() {
        let room = Room::new(Uuid::now_v7());
        let (slow, _rx_slow) = Connection::open(1);
        let (fast, mut rx_fast) = Connection::open(4);
        room.join(slow);
        room.join(fast);

        assert_eq!(room.broadcast(Arc::from("a")).dropped, 0);
        assert_eq!(room.broadcast(Arc::from("b")).dropped, 1);
        assert_eq!(room.len(), 1);
        assert_eq!(&*rx_fast.recv().await.unwrap(), "a");
        assert_eq!(&*rx_fast.recv().await.unwrap(), "b");
    }

    #[test]
    fn empty_room_broadcast_is_a_no_op() {
        let room = Room::new(Uuid::now_v7());
        assert_eq!(room.broadcast(Arc::from("x")), Delivery::default());
        assert!(room.is_empty());
    }

    fn event(actor: &str) -> Event {
        Event {
            kind: EventKind::Snooze,
            actor: actor.to_owned(),
            payload: Payload::status(&[]),
        }
    }

    fn actor(msg: &str) -> String {
        let json: serde_json::Value = serde_json::from_str(msg).unwrap();
        json["username"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn tickets_publish_in_the_order_drawn() {
        let room = Arc::new(Room::new(Uuid::now_v7()));
        let (conn, mut rx) = Connection::open(4);
        room.join(conn);

        let first = room.ticket();
        let second = room.ticket();
        assert_eq!(second.number(), first.number() + 1);

        let late = tokio::spawn({
            let room = room.clone();
            async move { room.publish_in_turn(second, &event("bob")).await }
        });
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        room.publish_in_turn(first, &event("ada")).await;
        late.await.unwrap();

        assert_eq!(actor(&rx.recv().await.unwrap()), "ada");
        assert_eq!(actor(&rx.recv().await.unwrap()), "bob");
    }

    #[tokio::test]
    async fn dropped_tickets_do_not_stall_the_room() {
        let room = Room::new(Uuid::now_v7());
        let (conn, mut rx) = Connection::open(4);
        room.join(conn);

        let first = room.ticket();
        let second = room.ticket();
        let third = room.ticket();

        drop(second);
        drop(first);
        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), room.publish_in_turn(third, &event("cy")))
            .await
            .expect("third ticket gets its turn");
        assert_eq!(delivery.delivered, 1);
        assert_eq!(actor(&rx.recv().await.unwrap()), "cy");

        room.publish_in_turn(room.ticket(), &event("dee")).await;
        assert_eq!(actor(&rx.recv().await.unwrap()), "dee");
    }

    #[test]
    fn leave_is_idempotent() {
        let room = Room::new(Uuid::now_v7());
        let (conn, _rx) = Connection::open(1);
        let id = conn.id();
        room.join(conn);

        assert!(room.leave(id));
        assert!(!room.leave(id));
        assert!(room.is_empty());
    }
}
