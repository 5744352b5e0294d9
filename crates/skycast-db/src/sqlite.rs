//! SQLite relational store: users, cities, subscriptions and weather readings.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::{CityStore, SubscriptionStore, UserStore, WeatherStore};
use skycast_core::types::{City, GeoMatch, Subscription, User, WeatherReading, WeatherSnapshot};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Relational database shared by the gateway, the provider and the runner.
pub struct Database {
    conn: Mutex<Connection>,
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, city_id, period_minutes, last_run_at, created_at";
const READING_COLUMNS: &str =
    "id, city_id, observed_at, description, temp, pressure, humidity, clouds, wind_speed";

impl Database {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SkycastError::Database(format!("open {}: {e}", path.display())))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::debug!("💾 Database schema ready");
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SkycastError::Database(format!("Lock: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                country TEXT NOT NULL DEFAULT '',
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                UNIQUE (lat, lon)
            );
            CREATE INDEX IF NOT EXISTS idx_cities_name ON cities(name);

            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                city_id INTEGER NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
                period_minutes INTEGER NOT NULL CHECK (period_minutes >= 1),
                last_run_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, city_id)
            );

            -- Append-only history, one row per successful fetch
            CREATE TABLE IF NOT EXISTS weather_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city_id INTEGER NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
                observed_at TEXT NOT NULL,
                description TEXT,
                temp REAL,
                pressure REAL,
                humidity REAL,
                clouds REAL,
                wind_speed REAL
            );
            CREATE INDEX IF NOT EXISTS idx_readings_city ON weather_readings(city_id, id);
            ",
        )
        .map_err(|e| SkycastError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Row counts per table, for health reporting.
    pub fn stats(&self) -> Result<serde_json::Value> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        };
        Ok(serde_json::json!({
            "users": count("users")?,
            "cities": count("cities")?,
            "subscriptions": count("subscriptions")?,
            "weather_readings": count("weather_readings")?,
        }))
    }
}

fn parse_time(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: parse_time(3, &created_at)?,
    })
}

fn city_from_row(row: &Row<'_>) -> rusqlite::Result<City> {
    Ok(City {
        id: row.get(0)?,
        name: row.get(1)?,
        country: row.get(2)?,
        lat: row.get(3)?,
        lon: row.get(4)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let last_run: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        city_id: row.get(2)?,
        period_minutes: row.get(3)?,
        last_run_at: last_run.as_deref().map(|t| parse_time(4, t)).transpose()?,
        created_at: parse_time(5, &created_at)?,
    })
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<WeatherReading> {
    let observed_at: String = row.get(2)?;
    Ok(WeatherReading {
        id: row.get(0)?,
        city_id: row.get(1)?,
        observed_at: parse_time(2, &observed_at)?,
        snapshot: WeatherSnapshot {
            description: row.get(3)?,
            temp: row.get(4)?,
            pressure: row.get(5)?,
            humidity: row.get(6)?,
            clouds: row.get(7)?,
            wind_speed: row.get(8)?,
        },
    })
}

// ── Users ──────────────────────────────

impl UserStore for Database {
    fn create_user(&self, username: &str, email: &str, token_hash: &str) -> Result<User> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (username, email, token_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, email, token_hash, now.to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                SkycastError::InvalidInput(format!("username '{username}' is taken"))
            } else {
                SkycastError::from(e)
            }
        })?;
        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            created_at: now,
        })
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, username, email, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?)
    }

    fn find_user_by_token(&self, token_hash: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, username, email, created_at FROM users WHERE token_hash = ?1",
                [token_hash],
                user_from_row,
            )
            .optional()?)
    }
}

// ── Cities ──────────────────────────────

impl CityStore for Database {
    fn get_city(&self, id: i64) -> Result<Option<City>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, country, lat, lon FROM cities WHERE id = ?1",
                [id],
                city_from_row,
            )
            .optional()?)
    }

    fn find_city_by_coords(&self, lat: f64, lon: f64) -> Result<Option<City>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, country, lat, lon FROM cities WHERE lat = ?1 AND lon = ?2",
                params![lat, lon],
                city_from_row,
            )
            .optional()?)
    }

    fn find_city_named_near(&self, name: &str, lat: f64, lon: f64) -> Result<Option<City>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, country, lat, lon FROM cities WHERE name = ?1
                 ORDER BY (lat - ?2) * (lat - ?2) + (lon - ?3) * (lon - ?3), id
                 LIMIT 1",
                params![name, lat, lon],
                city_from_row,
            )
            .optional()?)
    }

    fn insert_city_if_absent(&self, city: &GeoMatch) -> Result<City> {
        let conn = self.conn()?;
        // A concurrent insert of the same coordinates is not an error: the
        // conflict is ignored and the surviving row is read back.
        conn.execute(
            "INSERT INTO cities (name, country, lat, lon) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(lat, lon) DO NOTHING",
            params![city.name, city.country, city.lat, city.lon],
        )?;
        conn.query_row(
            "SELECT id, name, country, lat, lon FROM cities WHERE lat = ?1 AND lon = ?2",
            params![city.lat, city.lon],
            city_from_row,
        )
        .map_err(SkycastError::from)
    }

    fn list_cities(&self) -> Result<Vec<City>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, country, lat, lon FROM cities ORDER BY id")?;
        let rows = stmt.query_map([], city_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ── Weather readings ──────────────────────────────

impl WeatherStore for Database {
    fn append_reading(&self, city_id: i64, snapshot: &WeatherSnapshot) -> Result<WeatherReading> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO weather_readings
             (city_id, observed_at, description, temp, pressure, humidity, clouds, wind_speed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                city_id,
                now.to_rfc3339(),
                snapshot.description,
                snapshot.temp,
                snapshot.pressure,
                snapshot.humidity,
                snapshot.clouds,
                snapshot.wind_speed,
            ],
        )?;
        Ok(WeatherReading {
            id: conn.last_insert_rowid(),
            city_id,
            observed_at: now,
            snapshot: snapshot.clone(),
        })
    }

    fn readings_for_city(&self, city_id: i64, limit: usize) -> Result<Vec<WeatherReading>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM weather_readings WHERE city_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![city_id, limit as i64], reading_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ── Subscriptions ──────────────────────────────

impl SubscriptionStore for Database {
    fn create_subscription(
        &self,
        user_id: i64,
        city_id: i64,
        period_minutes: u32,
    ) -> Result<Subscription> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO subscriptions (user_id, city_id, period_minutes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, city_id, period_minutes, now.to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                SkycastError::DuplicateSubscription { user_id, city_id }
            } else {
                SkycastError::from(e)
            }
        })?;
        Ok(Subscription {
            id: conn.last_insert_rowid(),
            user_id,
            city_id,
            period_minutes,
            last_run_at: None,
            created_at: now,
        })
    }

    fn get_subscription(&self, id: i64) -> Result<Option<Subscription>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
                [id],
                subscription_from_row,
            )
            .optional()?)
    }

    fn list_subscriptions(&self, user_id: Option<i64>) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let rows = match user_id {
            Some(uid) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1 ORDER BY id"
                ))?;
                stmt.query_map([uid], subscription_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY id"
                ))?;
                stmt.query_map([], subscription_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    fn update_period(&self, id: i64, period_minutes: u32) -> Result<Subscription> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE subscriptions SET period_minutes = ?1 WHERE id = ?2",
            params![period_minutes, id],
        )?;
        if changed == 0 {
            return Err(SkycastError::SubscriptionNotFound(id));
        }
        conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
            [id],
            subscription_from_row,
        )
        .map_err(SkycastError::from)
    }

    fn delete_subscription(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM subscriptions WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    fn touch_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE subscriptions SET last_run_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }
}
