//! SQLite-backed goal store.
//!
//! A single `Mutex<Connection>` serializes access; every query runs on
//! tokio's blocking pool so tracker tasks never stall a runtime worker.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};

use super::GoalStore;
use super::schema::{apply_schema, read_schema_version};
use crate::error::EngineError;
use crate::goal::{GoalSnapshot, PointsUpdate, UserId};

/// Goal store backed by one SQLite file.
pub struct SqliteGoalStore {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGoalStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        apply_schema(&conn).map_err(store_err)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        apply_schema(&conn).map_err(store_err)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version recorded in `schema_meta`.
    pub async fn schema_version(&self) -> crate::Result<Option<u32>> {
        self.with_conn(|conn| read_schema_version(conn)).await
    }

    /// Stored completion flag for `day`, `None` when no goal row exists.
    pub async fn completion_state(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> crate::Result<Option<bool>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT completed FROM user_goals WHERE user_id = ?1 AND goal_date = ?2",
                params![user_id.to_string(), day.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|flag| flag.map(|v| v != 0))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| EngineError::Store(format!("connection lock poisoned: {e}")))?;
            f(&guard).map_err(store_err)
        })
        .await
        .map_err(|e| EngineError::Store(format!("store task failed: {e}")))?
    }
}

fn store_err(e: rusqlite::Error) -> EngineError {
    EngineError::Store(e.to_string())
}

fn read_snapshot(
    conn: &Connection,
    user_id: &str,
    day: &str,
) -> rusqlite::Result<GoalSnapshot> {
    conn.query_row(
        "SELECT \
             COALESCE((SELECT total_points FROM daily_points \
                       WHERE user_id = ?1 AND logged_date = ?2), 0), \
             COALESCE((SELECT goal_points FROM user_goals \
                       WHERE user_id = ?1 AND goal_date = ?2), 0)",
        params![user_id, day],
        |row| Ok(GoalSnapshot::new(row.get(0)?, row.get(1)?)),
    )
}

#[async_trait]
impl GoalStore for SqliteGoalStore {
    async fn read_goal_snapshot(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> crate::Result<GoalSnapshot> {
        self.with_conn(move |conn| read_snapshot(conn, &user_id.to_string(), &day.to_string()))
            .await
    }

    async fn write_goal_completion_state(
        &self,
        user_id: UserId,
        day: NaiveDate,
        completed: bool,
    ) -> crate::Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_goals (user_id, goal_date, completed) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(user_id, goal_date) DO UPDATE SET completed = excluded.completed",
                params![user_id.to_string(), day.to_string(), i64::from(completed)],
            )
            .map(|_| ())
        })
        .await
    }

    async fn set_goal(
        &self,
        user_id: UserId,
        day: NaiveDate,
        goal_points: i64,
    ) -> crate::Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_goals (user_id, goal_date, goal_points) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(user_id, goal_date) DO UPDATE SET goal_points = excluded.goal_points",
                params![user_id.to_string(), day.to_string(), goal_points],
            )
            .map(|_| ())
        })
        .await
    }

    async fn add_points(
        &self,
        user_id: UserId,
        day: NaiveDate,
        points: i64,
    ) -> crate::Result<PointsUpdate> {
        self.with_conn(move |conn| {
            let user = user_id.to_string();
            let day = day.to_string();
            let tx = conn.unchecked_transaction()?;
            let before = read_snapshot(&tx, &user, &day)?;
            let total = match before.total_after(points) {
                Ok(total) => total,
                Err(e) => return Ok(Err(e)),
            };
            tx.execute(
                "INSERT INTO daily_points (user_id, logged_date, total_points) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(user_id, logged_date) \
                 DO UPDATE SET total_points = excluded.total_points",
                params![user, day, total],
            )?;
            let after = read_snapshot(&tx, &user, &day)?;
            tx.commit()?;
            Ok(Ok(PointsUpdate { before, after }))
        })
        .await?
    }
}
