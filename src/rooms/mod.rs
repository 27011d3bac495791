mod room;
mod ws;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use axum::{Router, routing::get};
use uuid::Uuid;

use crate::{
    AppState,
    error::{SnuzError, SnuzResult},
    event::Event,
};

pub use room::{Connection, Delivery, Room};

pub fn router() -> Router<AppState> {
    Router::new().route("/{username}", get(ws::group_ws))
}

/// Every live group's room, keyed by group id. The map lock is only held
/// to look a room up; each room guards its own connections.
#[derive(Default)]
pub struct Rooms {
    rooms: RwLock<HashMap<Uuid, Arc<Room>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: an existing room is returned untouched.
    pub fn open(&self, group_id: Uuid) -> Arc<Room> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(group_id)
            .or_insert_with(|| Arc::new(Room::new(group_id)))
            .clone()
    }

    pub fn close(&self, group_id: Uuid) -> Option<Arc<Room>> {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group_id)
    }

    pub fn get(&self, group_id: Uuid) -> SnuzResult<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group_id)
            .cloned()
            .ok_or(SnuzError::UnknownRoom(group_id))
    }

    pub fn contains(&self, group_id: Uuid) -> bool {
        self.get(group_id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn join(&self, group_id: Uuid, connection: Connection) -> SnuzResult<Arc<Room>> {
        let room = self.get(group_id)?;
        room.join(connection);
        Ok(room)
    }

    pub fn leave(&self, group_id: Uuid, connection_id: Uuid) {
        if let Ok(room) = self.get(group_id) {
            room.leave(connection_id);
        }
    }

    pub fn broadcast(&self, group_id: Uuid, event: &Event) -> SnuzResult<Delivery> {
        Ok(self.get(group_id)?.publish(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, Payload};

    fn event() -> Event {
        Event {
            kind: EventKind::Snooze,
            actor: "ada".to_owned(),
            payload: Payload::status(&[]),
        }
    }

    #[test]
    fn join_needs_a_live_room() {
        let rooms = Rooms::new();
        let group_id = Uuid::now_v7();
        let (conn, _rx) = Connection::open(1);

        assert!(matches!(
            rooms.join(group_id, conn.clone()),
            Err(SnuzError::UnknownRoom(id)) if id == group_id
        ));

        rooms.open(group_id);
        assert_eq!(rooms.join(group_id, conn).unwrap().len(), 1);
    }

    #[test]
    fn rooms_outlive_their_connections() {
        let rooms = Rooms::new();
        let group_id = Uuid::now_v7();
        rooms.open(group_id);

        let (conn, _rx) = Connection::open(1);
        let id = conn.id();
        rooms.join(group_id, conn).unwrap();
        rooms.leave(group_id, id);
        rooms.leave(group_id, id);

        assert!(rooms.contains(group_id));
        assert_eq!(rooms.broadcast(group_id, &event()).unwrap(), Delivery::default());
    }

    #[test]
    fn close_removes_only_that_group() {
        let rooms = Rooms::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let room_a = rooms.open(a);
        rooms.open(b);
        assert!(Arc::ptr_eq(&room_a, &rooms.open(a)));

        assert!(rooms.close(a).is_some());
        assert!(rooms.close(a).is_none());
        assert!(!rooms.contains(a));
        assert!(rooms.contains(b));
        assert!(matches!(rooms.broadcast(a, &event()), Err(SnuzError::UnknownRoom(_))));
    }

    #[tokio::test]
    async fn broadcast_encodes_the_event() {
        let rooms = Rooms::new();
        let group_id = Uuid::now_v7();
        rooms.open(group_id);
        let (conn, mut rx) = Connection::open(1);
        rooms.join(group_id, conn).unwrap();

        rooms.broadcast(group_id, &event()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["operation"], "to-snooze");
        assert_eq!(json["username"], "ada");
    }
}
