mod memory;
mod sqlite;

use std::future::Future;

use uuid::Uuid;

use crate::{error::SnuzResult, group::Group, member::Member};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Everything one operation writes. A store applies all of it or none of it.
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub members: Vec<Member>,
    pub save_group: Option<Group>,
    pub delete_group: Option<Uuid>,
}

impl Changeset {
    pub fn member(member: Member) -> Self {
        Changeset {
            members: vec![member],
            ..Default::default()
        }
    }
}

/// Persistence for members and groups. Errors are surfaced to the caller
/// as-is; nothing here retries.
pub trait Store: Send + Sync + 'static {
    fn find_member(&self, username: &str) -> impl Future<Output = SnuzResult<Option<Member>>> + Send;

    fn find_group(&self, group_id: Uuid) -> impl Future<Output = SnuzResult<Option<Group>>> + Send;

    fn group_members(&self, group_id: Uuid) -> impl Future<Output = SnuzResult<Vec<Member>>> + Send;

    fn list_members(&self) -> impl Future<Output = SnuzResult<Vec<Member>>> + Send;

    /// Ids of every group that has not been dissolved.
    fn group_ids(&self) -> impl Future<Output = SnuzResult<Vec<Uuid>>> + Send;

    /// Fails with `Validation` if the username is taken.
    fn insert_member(&self, member: &Member) -> impl Future<Output = SnuzResult<()>> + Send;

    fn commit(&self, changes: Changeset) -> impl Future<Output = SnuzResult<()>> + Send;
}

/// The store picked at startup.
pub enum AnyStore {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl Store for AnyStore {
    async fn find_member(&self, username: &str) -> SnuzResult<Option<Member>> {
        match self {
            AnyStore::Sqlite(store) => store.find_member(username).await,
            AnyStore::Memory(store) => store.find_member(username).await,
        }
    }

    async fn find_group(&self, group_id: Uuid) -> SnuzResult<Option<Group>> {
        match self {
            AnyStore::Sqlite(store) => store.find_group(group_id).await,
            AnyStore::Memory(store) => store.find_group(group_id).await,
        }
    }

    async fn group_members(&self, group_id: Uuid) -> SnuzResult<Vec<Member>> {
        match self {
            AnyStore::Sqlite(store) => store.group_members(group_id).await,
            AnyStore::Memory(store) => store.group_members(group_id).await,
        }
    }

    async fn list_members(&self) -> SnuzResult<Vec<Member>> {
        match self {
            AnyStore::Sqlite(store) => store.list_members().await,
            AnyStore::Memory(store) => store.list_members().await,
        }
    }

    async fn group_ids(&self) -> SnuzResult<Vec<Uuid>> {
        match self {
            AnyStore::Sqlite(store) => store.group_ids().await,
            AnyStore::Memory(store) => store.group_ids().await,
        }
    }

    async fn insert_member(&self, member: &Member) -> SnuzResult<()> {
        match self {
            AnyStore::Sqlite(store) => store.insert_member(member).await,
            AnyStore::Memory(store) => store.insert_member(member).await,
        }
    }

    async fn commit(&self, changes: Changeset) -> SnuzResult<()> {
        match self {
            AnyStore::Sqlite(store) => store.commit(changes).await,
            AnyStore::Memory(store) => store.commit(changes).await,
        }
    }
}
