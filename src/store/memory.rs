use std::{collections::HashMap, sync::Mutex};

use uuid::Uuid;

use crate::{
    error::{SnuzError, SnuzResult},
    group::Group,
    member::Member,
};

use super::{Changeset, Store};

#[derive(Default)]
struct Tables {
    members: HashMap<String, Member>,
    groups: HashMap<Uuid, Group>,
}

/// Process-local store. Everything is lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    #[cfg(test)]
    fail_commits: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> SnuzResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| SnuzError::Persistence(anyhow::anyhow!("memory store poisoned")))
    }

    #[cfg(test)]
    pub(crate) fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_commit(&self) -> SnuzResult<()> {
        if self.fail_commits.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SnuzError::Persistence(anyhow::anyhow!("commit refused")));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_commit(&self) -> SnuzResult<()> {
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn find_member(&self, username: &str) -> SnuzResult<Option<Member>> {
        Ok(self.tables()?.members.get(username).cloned())
    }

    async fn find_group(&self, group_id: Uuid) -> SnuzResult<Option<Group>> {
        Ok(self.tables()?.groups.get(&group_id).cloned())
    }

    async fn group_members(&self, group_id: Uuid) -> SnuzResult<Vec<Member>> {
        let mut members: Vec<Member> = self
            .tables()?
            .members
            .values()
            .filter(|m| m.group_id == Some(group_id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    async fn list_members(&self) -> SnuzResult<Vec<Member>> {
        let mut members: Vec<Member> = self.tables()?.members.values().cloned().collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    async fn group_ids(&self) -> SnuzResult<Vec<Uuid>> {
        Ok(self.tables()?.groups.keys().copied().collect())
    }

    async fn insert_member(&self, member: &Member) -> SnuzResult<()> {
        let mut tables = self.tables()?;
        if tables.members.contains_key(&member.username) {
            return Err(SnuzError::Validation(format!("member already exists: {}", member.username)));
        }
        tables.members.insert(member.username.clone(), member.clone());
        Ok(())
    }

    async fn commit(&self, changes: Changeset) -> SnuzResult<()> {
        self.check_commit()?;

        let mut tables = self.tables()?;
        if let Some(group) = changes.save_group {
            tables.groups.insert(group.id, group);
        }
        for member in changes.members {
            tables.members.insert(member.username.clone(), member);
        }
        if let Some(group_id) = changes.delete_group {
            tables.groups.remove(&group_id);
        }
        Ok(())
    }
}
