use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    error::{SnuzError, SnuzResult},
    group::Group,
    include_res,
    member::{Member, SleepState},
};

use super::{Changeset, Store};

type MemberRow = (
    String,
    Option<String>,
    u8,
    Option<i64>,
    bool,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    u32,
);

type GroupRow = (String, String, OffsetDateTime, OffsetDateTime, u32, u32, Date);

const MEMBER_COLUMNS: &str =
    "username,group_id,score,avg_sleep_minutes,is_asleep,last_sleep_at,last_wake_at,snooze_count";
const GROUP_COLUMNS: &str = "id,owner,to_sleep_at,to_wake_at,duration_days,days_remaining,start_date";

fn parse_id(raw: &str) -> SnuzResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| SnuzError::Persistence(err.into()))
}

fn member_from_row(
    (username, group_id, score, avg_sleep_minutes, is_asleep, last_sleep_at, last_wake_at, snooze_count): MemberRow,
) -> SnuzResult<Member> {
    Ok(Member {
        username,
        group_id: group_id.as_deref().map(parse_id).transpose()?,
        sleep_state: if is_asleep { SleepState::Asleep } else { SleepState::Awake },
        last_sleep_at,
        last_wake_at,
        snooze_count,
        avg_sleep_minutes,
        score,
    })
}

fn group_from_row(
    (id, owner, to_sleep_at, to_wake_at, duration_days, days_remaining, start_date): GroupRow,
) -> SnuzResult<Group> {
    Ok(Group {
        id: parse_id(&id)?,
        owner,
        to_sleep_at,
        to_wake_at,
        duration_days,
        days_remaining,
        start_date,
    })
}

#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    /// Connects and applies the schema. The database file is created if
    /// missing.
    pub async fn connect(url: &str, max_connections: u32) -> SnuzResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let db_pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(include_res!(str, "/schema.sql"))
            .execute(&db_pool)
            .await?;

        Ok(SqliteStore { db_pool })
    }
}

impl Store for SqliteStore {
    async fn find_member(&self, username: &str) -> SnuzResult<Option<Member>> {
        sqlx::query_as::<_, MemberRow>(&format!("SELECT {MEMBER_COLUMNS} FROM members WHERE username=?"))
            .bind(username)
            .fetch_optional(&self.db_pool)
            .await?
            .map(member_from_row)
            .transpose()
    }

    async fn find_group(&self, group_id: Uuid) -> SnuzResult<Option<Group>> {
        sqlx::query_as::<_, GroupRow>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id=?"))
            .bind(group_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(group_from_row)
            .transpose()
    }

    async fn group_members(&self, group_id: Uuid) -> SnuzResult<Vec<Member>> {
        sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE group_id=? ORDER BY username"
        ))
        .bind(group_id.to_string())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(member_from_row)
        .collect()
    }

    async fn list_members(&self) -> SnuzResult<Vec<Member>> {
        sqlx::query_as::<_, MemberRow>(&format!("SELECT {MEMBER_COLUMNS} FROM members ORDER BY username"))
            .fetch_all(&self.db_pool)
            .await?
            .into_iter()
            .map(member_from_row)
            .collect()
    }

    async fn group_ids(&self) -> SnuzResult<Vec<Uuid>> {
        sqlx::query_as::<_, (String,)>("SELECT id FROM groups")
            .fetch_all(&self.db_pool)
            .await?
            .iter()
            .map(|(id,)| parse_id(id))
            .collect()
    }

    async fn insert_member(&self, member: &Member) -> SnuzResult<()> {
        let result = sqlx::query(&format!("INSERT INTO members ({MEMBER_COLUMNS}) VALUES (?,?,?,?,?,?,?,?)"))
            .bind(&member.username)
            .bind(member.group_id.as_ref().map(Uuid::to_string))
            .bind(member.score)
            .bind(member.avg_sleep_minutes)
            .bind(member.is_asleep())
            .bind(member.last_sleep_at)
            .bind(member.last_wake_at)
            .bind(member.snooze_count)
            .execute(&self.db_pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(SnuzError::Validation(
                format!("member already exists: {}", member.username),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn commit(&self, changes: Changeset) -> SnuzResult<()> {
        let mut tx = self.db_pool.begin().await?;

        if let Some(group) = &changes.save_group {
            sqlx::query(&format!(
                "INSERT INTO groups ({GROUP_COLUMNS}) VALUES (?,?,?,?,?,?,?) \
                 ON CONFLICT(id) DO UPDATE SET to_sleep_at=excluded.to_sleep_at,to_wake_at=excluded.to_wake_at,\
                 days_remaining=excluded.days_remaining"
            ))
            .bind(group.id.to_string())
            .bind(&group.owner)
            .bind(group.to_sleep_at)
            .bind(group.to_wake_at)
            .bind(group.duration_days)
            .bind(group.days_remaining)
            .bind(group.start_date)
            .execute(&mut *tx)
            .await?;
        }

        for member in &changes.members {
            sqlx::query(
                "UPDATE members SET group_id=?,score=?,avg_sleep_minutes=?,is_asleep=?,\
                 last_sleep_at=?,last_wake_at=?,snooze_count=? WHERE username=?",
            )
            .bind(member.group_id.as_ref().map(Uuid::to_string))
            .bind(member.score)
            .bind(member.avg_sleep_minutes)
            .bind(member.is_asleep())
            .bind(member.last_sleep_at)
            .bind(member.last_wake_at)
            .bind(member.snooze_count)
            .bind(&member.username)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(group_id) = changes.delete_group {
            sqlx::query("DELETE FROM groups WHERE id=?")
                .bind(group_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, time};

    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn members_round_trip() {
        let store = store().await;
        store.insert_member(&Member::new("ada")).await.unwrap();

        let found = store.find_member("ada").await.unwrap().unwrap();
        assert_eq!(found, Member::new("ada"));
        assert!(store.find_member("bob").await.unwrap().is_none());

        assert!(matches!(
            store.insert_member(&Member::new("ada")).await,
            Err(SnuzError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn commit_writes_group_and_members_together() {
        let store = store().await;
        store.insert_member(&Member::new("ada")).await.unwrap();
        store.insert_member(&Member::new("bob")).await.unwrap();

        let group = Group::new("ada".to_owned(), date!(2026-10-20), time!(22:30), time!(06:30), 2).unwrap();
        let mut ada = Member::new("ada");
        ada.group_id = Some(group.id);
        ada.fall_asleep(datetime!(2026-10-20 22:31 UTC)).unwrap();
        ada.snooze_count = 2;

        store
            .commit(Changeset {
                members: vec![ada.clone()],
                save_group: Some(group.clone()),
                delete_group: None,
            })
            .await
            .unwrap();

        assert_eq!(store.find_group(group.id).await.unwrap(), Some(group.clone()));
        assert_eq!(store.group_members(group.id).await.unwrap(), vec![ada.clone()]);
        assert_eq!(store.group_ids().await.unwrap(), vec![group.id]);

        ada.group_id = None;
        store
            .commit(Changeset {
                members: vec![ada.clone()],
                save_group: None,
                delete_group: Some(group.id),
            })
            .await
            .unwrap();

        assert_eq!(store.find_group(group.id).await.unwrap(), None);
        assert_eq!(store.find_member("ada").await.unwrap(), Some(ada));
        assert_eq!(store.list_members().await.unwrap().len(), 2);
    }
}
