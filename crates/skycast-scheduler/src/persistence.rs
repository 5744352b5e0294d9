//! SQLite-backed persistence for schedule entries.
//! Survives restarts; lives in its own database file, separate from the
//! relational store.

use crate::store::ScheduleStore;
use crate::tasks::{ForecastArgs, Interval, IntervalUnit, ScheduleEntry};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use skycast_core::error::{Result, SkycastError};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const ENTRY_COLUMNS: &str = "key, interval_value, interval_unit, task, args, target, start_time, \
                             created_at, last_run, next_run, run_count, enabled";

/// SQLite schedule store.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

impl SchedulerDb {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SkycastError::Database(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SkycastError::Database(format!("Lock: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS schedule_entries (
                key TEXT PRIMARY KEY,
                interval_value INTEGER NOT NULL,
                interval_unit TEXT NOT NULL,     -- 'seconds', 'minutes', 'hours', 'days'
                task TEXT NOT NULL,
                args TEXT NOT NULL,              -- JSON: {email, city}
                target INTEGER NOT NULL,         -- subscription id
                start_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_run TEXT,
                next_run TEXT NOT NULL,
                run_count INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_schedule_next_run ON schedule_entries(next_run);
         ",
            )
            .map_err(|e| SkycastError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Number of stored entries.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM schedule_entries", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn parse_time(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleEntry> {
    let unit_str: String = row.get(2)?;
    let args_str: String = row.get(4)?;
    let start_time: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let last_run: Option<String> = row.get(8)?;
    let next_run: String = row.get(9)?;

    let unit = IntervalUnit::parse(&unit_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown interval unit '{unit_str}'").into(),
        )
    })?;
    let args: ForecastArgs = serde_json::from_str(&args_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(ScheduleEntry {
        key: row.get(0)?,
        interval: Interval { every: row.get(1)?, unit },
        task: row.get(3)?,
        args,
        target: row.get(5)?,
        start_time: parse_time(6, &start_time)?,
        created_at: parse_time(7, &created_at)?,
        last_run: last_run.as_deref().map(|t| parse_time(8, t)).transpose()?,
        next_run: parse_time(9, &next_run)?,
        run_count: row.get(10)?,
        enabled: row.get::<_, i32>(11)? != 0,
    })
}

fn select_entry(conn: &Connection, key: &str) -> rusqlite::Result<Option<ScheduleEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE key = ?1"),
        [key],
        entry_from_row,
    )
    .optional()
}

impl ScheduleStore for SchedulerDb {
    fn insert(&self, entry: &ScheduleEntry) -> Result<()> {
        let args = serde_json::to_string(&entry.args)?;
        let changed = self.conn()?.execute(
            &format!(
                "INSERT OR IGNORE INTO schedule_entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                entry.key,
                entry.interval.every,
                entry.interval.unit.as_str(),
                entry.task,
                args,
                entry.target,
                entry.start_time.to_rfc3339(),
                entry.created_at.to_rfc3339(),
                entry.last_run.map(|t| t.to_rfc3339()),
                entry.next_run.to_rfc3339(),
                entry.run_count,
                entry.enabled as i32,
            ],
        )?;
        if changed == 0 {
            return Err(SkycastError::DuplicateSchedule(entry.key.clone()));
        }
        Ok(())
    }

    fn mark_run(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ScheduleEntry>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(mut entry) = select_entry(&tx, key)? else {
            return Ok(None);
        };
        if !entry.is_due(now) {
            return Ok(None);
        }

        entry.advance(now);
        tx.execute(
            "UPDATE schedule_entries SET last_run = ?2, next_run = ?3, run_count = ?4
             WHERE key = ?1",
            params![
                key,
                entry.last_run.map(|t| t.to_rfc3339()),
                entry.next_run.to_rfc3339(),
                entry.run_count,
            ],
        )?;
        tx.commit()?;
        Ok(Some(entry))
    }

    fn set_interval(&self, key: &str, interval: Interval) -> Result<Option<ScheduleEntry>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(mut entry) = select_entry(&tx, key)? else {
            return Ok(None);
        };

        entry.set_interval(interval);
        tx.execute(
            "UPDATE schedule_entries SET interval_value = ?2, interval_unit = ?3, next_run = ?4
             WHERE key = ?1",
            params![
                key,
                entry.interval.every,
                entry.interval.unit.as_str(),
                entry.next_run.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(Some(entry))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM schedule_entries WHERE key = ?1", [key])?;
        Ok(changed > 0)
    }

    fn get(&self, key: &str) -> Result<Option<ScheduleEntry>> {
        Ok(select_entry(&*self.conn()?, key)?)
    }

    fn list(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM schedule_entries ORDER BY created_at, key"
        ))?;
        let rows = stmt.query_map([], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
