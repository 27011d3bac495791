//! The sleep challenge: transitions, scoring and rollover for a group,
//! committed atomically and then fanned out to the group's room.
//!
//! Every transition of a group runs under that group's lock, from the first
//! read to the commit. A publish ticket is drawn from the room before the
//! lock is released. Narration and fan-out then run with no lock held, and
//! the tickets keep the group's events leaving in commit order.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError},
};

use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{SnuzError, SnuzResult},
    event::{Event, EventKind, Payload},
    group::{self, Group, Rollover},
    member::{self, Member},
    narrator::{Narrator, Prompt},
    rooms::{Connection, Room, Rooms},
    store::{Changeset, Store},
};

/// Input for a new group, still unparsed.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub owner: String,
    pub members: Vec<String>,
    pub to_sleep_at: String,
    pub to_wake_at: String,
    pub duration_days: i64,
    pub start_date: String,
}

#[derive(Debug, Clone)]
pub struct GroupView {
    pub group: Group,
    pub members: Vec<String>,
}

/// A live connection to a group's room.
pub struct Subscription {
    pub group_id: Uuid,
    pub connection_id: Uuid,
    pub rx: mpsc::Receiver<Arc<str>>,
}

#[derive(Default)]
struct GroupLocks {
    locks: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    async fn acquire(&self, group_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(group_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, group_id: Uuid) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group_id);
    }
}

/// A group loaded under its lock.
struct Locked {
    guard: OwnedMutexGuard<()>,
    group: Group,
    members: Vec<Member>,
    actor: usize,
    room: Arc<Room>,
}

impl Locked {
    fn actor(&self) -> &Member {
        &self.members[self.actor]
    }

    fn actor_mut(&mut self) -> &mut Member {
        &mut self.members[self.actor]
    }
}

pub struct Challenge<S> {
    store: S,
    rooms: Rooms,
    narrator: Narrator,
    locks: GroupLocks,
    creating: Mutex<()>,
}

impl<S: Store> Challenge<S> {
    pub fn new(store: S, narrator: Narrator) -> Self {
        Challenge {
            store,
            rooms: Rooms::new(),
            narrator,
            locks: GroupLocks::default(),
            creating: Mutex::new(()),
        }
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Opens a room for every group already in the store. Returns how many.
    pub async fn restore_rooms(&self) -> SnuzResult<usize> {
        let group_ids = self.store.group_ids().await?;
        for group_id in &group_ids {
            self.rooms.open(*group_id);
        }
        Ok(group_ids.len())
    }

    pub async fn register(&self, username: &str) -> SnuzResult<Member> {
        member::validate_username(username)?;
        let member = Member::new(username);
        self.store.insert_member(&member).await?;
        info!(username, "member registered");
        Ok(member)
    }

    pub async fn member(&self, username: &str) -> SnuzResult<Member> {
        self.store
            .find_member(username)
            .await?
            .ok_or_else(|| SnuzError::member_not_found(username))
    }

    pub async fn members(&self) -> SnuzResult<Vec<Member>> {
        self.store.list_members().await
    }

    /// Whether the member owns the group they are currently in.
    pub async fn owns_group(&self, member: &Member) -> SnuzResult<bool> {
        let Some(group_id) = member.group_id else {
            return Ok(false);
        };
        Ok(self
            .store
            .find_group(group_id)
            .await?
            .is_some_and(|group| group.owner == member.username))
    }

    /// Owner of every live group, by group id.
    pub async fn group_owners(&self) -> SnuzResult<HashMap<Uuid, String>> {
        let mut owners = HashMap::new();
        for group_id in self.store.group_ids().await? {
            if let Some(group) = self.store.find_group(group_id).await? {
                owners.insert(group_id, group.owner);
            }
        }
        Ok(owners)
    }

    pub async fn group_of(&self, username: &str) -> SnuzResult<Option<GroupView>> {
        let Some(group_id) = self.member(username).await?.group_id else {
            return Ok(None);
        };
        let Some(group) = self.store.find_group(group_id).await? else {
            return Ok(None);
        };
        let members = self
            .store
            .group_members(group_id)
            .await?
            .into_iter()
            .map(|m| m.username)
            .collect();
        Ok(Some(GroupView { group, members }))
    }

    pub async fn create_group(&self, new_group: NewGroup, now: OffsetDateTime) -> SnuzResult<Group> {
        // one creation at a time, so two groups cannot both claim a member
        let _creating = self.creating.lock().await;

        let mut names = vec![new_group.owner.clone()];
        for name in new_group.members {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let mut members = Vec::with_capacity(names.len());
        for name in &names {
            members.push(self.member(name).await?);
        }
        if let Some(taken) = members.iter().find(|m| m.group_id.is_some()) {
            return Err(SnuzError::MembershipConflict(taken.username.clone()));
        }

        let duration_days = u32::try_from(new_group.duration_days)
            .ok()
            .filter(|days| *days >= 1)
            .ok_or_else(|| SnuzError::Validation("duration must be at least 1 day".to_owned()))?;

        let start_date = group::parse_date("start date", &new_group.start_date)?;
        if start_date < now.date() {
            return Err(SnuzError::Validation("start date must not be in the past".to_owned()));
        }

        let sleep_at = group::parse_instant("sleep time", &new_group.to_sleep_at)?;
        if sleep_at < now {
            return Err(SnuzError::Validation("cannot schedule a sleeping time in the past".to_owned()));
        }
        let wake_at = group::parse_instant("wake time", &new_group.to_wake_at)?;

        let group = Group::new(new_group.owner, start_date, sleep_at.time(), wake_at.time(), duration_days)?;
        for member in &mut members {
            member.group_id = Some(group.id);
        }

        self.store
            .commit(Changeset {
                members,
                save_group: Some(group.clone()),
                delete_group: None,
            })
            .await?;
        self.rooms.open(group.id);

        info!(group_id = %group.id, owner = %group.owner, members = names.len(), duration_days, "group created");
        Ok(group)
    }

    /// Takes the member's group lock and loads the group. The member is read
    /// again under the lock since the group may have dissolved meanwhile.
    async fn lock_group(&self, username: &str) -> SnuzResult<Locked> {
        let not_grouped = || SnuzError::InvalidTransition(format!("{username} is not in a group"));

        let group_id = self.member(username).await?.group_id.ok_or_else(not_grouped)?;
        let guard = self.locks.acquire(group_id).await;

        if self.member(username).await?.group_id != Some(group_id) {
            return Err(not_grouped());
        }
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or_else(|| SnuzError::group_not_found(group_id))?;
        let room = self.rooms.get(group_id)?;
        let members = self.store.group_members(group_id).await?;
        let actor = members
            .iter()
            .position(|m| m.username == username)
            .ok_or_else(not_grouped)?;

        Ok(Locked {
            guard,
            group,
            members,
            actor,
            room,
        })
    }

    /// Releases the group lock and fans the event out. Narration happens
    /// here, after the commit, so it can never hold a transition back.
    async fn publish(&self, locked: Locked, kind: EventKind, mut payload: Payload, prompt: Prompt<'_>) -> Event {
        let Locked { guard, room, members, actor, .. } = locked;

        let ticket = room.ticket();
        drop(guard);

        payload.message = self.narrator.narrate(prompt).await;
        let event = Event {
            kind,
            actor: members[actor].username.clone(),
            payload,
        };
        let delivery = room.publish_in_turn(ticket, &event).await;

        debug!(
            group_id = %room.group_id(),
            actor = %event.actor,
            kind = ?event.kind,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "event published"
        );
        event
    }

    pub async fn sleep(&self, username: &str, now: OffsetDateTime) -> SnuzResult<Event> {
        let mut locked = self.lock_group(username).await?;
        locked.actor_mut().fall_asleep(now)?;
        self.store.commit(Changeset::member(locked.actor().clone())).await?;

        let payload = Payload::status(&locked.members);
        let prompt = Prompt::FellAsleep { username, at: now };
        Ok(self.publish(locked, EventKind::Sleep, payload, prompt).await)
    }

    pub async fn snooze(&self, username: &str, now: OffsetDateTime) -> SnuzResult<Event> {
        let mut locked = self.lock_group(username).await?;
        locked.actor_mut().snooze()?;
        self.store.commit(Changeset::member(locked.actor().clone())).await?;

        let payload = Payload::status(&locked.members);
        let prompt = Prompt::Snoozed { username, at: now };
        Ok(self.publish(locked, EventKind::Snooze, payload, prompt).await)
    }

    /// Wakes the member and, when that leaves the whole group awake, closes
    /// the day: the schedule moves on, or the group dissolves on its last
    /// day. Both land in the same commit as the wake.
    pub async fn wake(&self, username: &str, now: OffsetDateTime) -> SnuzResult<Event> {
        let mut locked = self.lock_group(username).await?;
        let target = locked.group.target();
        let scored = locked.actor_mut().wake(now, target)?;

        let everyone_awake = locked.members.iter().all(|m| !m.is_asleep());
        let rollover = everyone_awake.then(|| locked.group.roll_over()).transpose()?;

        let changes = match rollover {
            None => Changeset::member(locked.actor().clone()),
            Some(Rollover::Advanced { .. }) => Changeset {
                members: vec![locked.actor().clone()],
                save_group: Some(locked.group.clone()),
                delete_group: None,
            },
            Some(Rollover::Dissolved) => {
                for member in &mut locked.members {
                    member.group_id = None;
                }
                Changeset {
                    members: locked.members.clone(),
                    save_group: None,
                    delete_group: Some(locked.group.id),
                }
            }
        };
        self.store.commit(changes).await?;

        let group_id = locked.group.id;
        match rollover {
            Some(Rollover::Advanced { days_remaining }) => {
                info!(%group_id, days_remaining, to_sleep_at = %locked.group.to_sleep_at, "group rolled over");
            }
            Some(Rollover::Dissolved) => {
                self.rooms.close(group_id);
                self.locks.forget(group_id);
                info!(%group_id, "group dissolved");
            }
            None => {}
        }

        let mut payload = Payload::status(&locked.members);
        payload.score = Some(scored.score);
        payload.days_remaining = rollover.map(|r| match r {
            Rollover::Advanced { days_remaining } => days_remaining,
            Rollover::Dissolved => 0,
        });
        payload.dissolved = rollover == Some(Rollover::Dissolved);

        debug!(username, minutes_slept = scored.minutes_slept, score = scored.score, "scored");
        let prompt = Prompt::Woke { username, at: now };
        Ok(self.publish(locked, EventKind::Wake, payload, prompt).await)
    }

    pub fn connect(&self, group_id: Uuid, buffer: usize) -> SnuzResult<Subscription> {
        let (connection, rx) = Connection::open(buffer);
        let connection_id = connection.id();
        self.rooms.join(group_id, connection)?;
        Ok(Subscription {
            group_id,
            connection_id,
            rx,
        })
    }

    /// Joins the room of the member's current group.
    pub async fn join_room(&self, username: &str, buffer: usize) -> SnuzResult<Subscription> {
        let group_id = self
            .member(username)
            .await?
            .group_id
            .ok_or_else(|| SnuzError::NotFound(format!("group of {username}")))?;
        self.connect(group_id, buffer)
    }
}
