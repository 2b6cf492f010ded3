// SQLite persistence layer for pipeline runs.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::joiner::RejectedRecord;
use crate::record::{FeatureRow, PlayerKey, Provenance, QualityFlags, Role};

/// SQLite-backed persistence for feature rows, rejected records, and run
/// metadata. Each pipeline invocation writes under a fresh run id, so
/// successive runs can be compared without clobbering each other.
pub struct FeatureStore {
    conn: Mutex<Connection>,
}

impl FeatureStore {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open feature store at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set feature store pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                run_id       TEXT PRIMARY KEY,
                started_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                first_year   INTEGER NOT NULL,
                last_year    INTEGER NOT NULL,
                row_count    INTEGER NOT NULL DEFAULT 0,
                reject_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS feature_rows (
                run_id     TEXT NOT NULL REFERENCES runs(run_id),
                player_key TEXT NOT NULL,
                year       INTEGER NOT NULL,
                role       TEXT NOT NULL,
                position   TEXT,
                features   TEXT NOT NULL,
                provenance TEXT NOT NULL,
                flags      TEXT NOT NULL,
                PRIMARY KEY (run_id, player_key, year, role)
            );

            CREATE TABLE IF NOT EXISTS rejected_records (
                run_id  TEXT NOT NULL REFERENCES runs(run_id),
                seq     INTEGER NOT NULL,
                record  TEXT NOT NULL,
                reason  TEXT NOT NULL,
                PRIMARY KEY (run_id, seq)
            );
            ",
        )
        .context("failed to create feature store schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("feature store mutex poisoned")
    }

    /// Register a run before writing its rows. Re-registering an existing
    /// run id is an error: run ids are timestamps and must be unique.
    pub fn begin_run(&self, run_id: &str, first_year: u16, last_year: u16) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO runs (run_id, first_year, last_year) VALUES (?1, ?2, ?3)",
            params![run_id, first_year, last_year],
        )
        .with_context(|| format!("failed to register run {run_id}"))?;
        Ok(())
    }

    /// Persist all feature rows for a run in one transaction.
    pub fn save_feature_rows(&self, run_id: &str, rows: &[FeatureRow]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin feature row transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO feature_rows
                        (run_id, player_key, year, role, position, features, provenance, flags)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .context("failed to prepare feature row insert")?;

            for row in rows {
                let features = serde_json::to_string(&row.features)
                    .context("failed to serialize feature values")?;
                let provenance = serde_json::to_string(&row.provenance)
                    .context("failed to serialize feature provenance")?;
                let flags = serde_json::to_string(&row.flags)
                    .context("failed to serialize quality flags")?;
                stmt.execute(params![
                    run_id,
                    row.key.as_str(),
                    row.year,
                    role_text(row.role),
                    row.position,
                    features,
                    provenance,
                    flags,
                ])
                .with_context(|| {
                    format!("failed to insert feature row for {} {}", row.key, row.year)
                })?;
            }
        }
        // Count update rides in the same transaction so the run row can
        // never disagree with its persisted rows.
        tx.execute(
            "UPDATE runs SET row_count = ?2 WHERE run_id = ?1",
            params![run_id, rows.len() as i64],
        )
        .context("failed to update run row count")?;
        tx.commit().context("failed to commit feature rows")?;
        Ok(())
    }

    /// Persist the rejected channel for a run. `seq` preserves the input
    /// order the joiner reported.
    pub fn save_rejected(&self, run_id: &str, rejected: &[RejectedRecord]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin rejected record transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO rejected_records (run_id, seq, record, reason)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("failed to prepare rejected record insert")?;

            for (seq, rej) in rejected.iter().enumerate() {
                let record = serde_json::to_string(&rej.record)
                    .context("failed to serialize rejected record")?;
                let reason = serde_json::to_string(&rej.reason)
                    .context("failed to serialize rejection reason")?;
                stmt.execute(params![run_id, seq as i64, record, reason])
                    .context("failed to insert rejected record")?;
            }
        }
        tx.execute(
            "UPDATE runs SET reject_count = ?2 WHERE run_id = ?1",
            params![run_id, rejected.len() as i64],
        )
        .context("failed to update run reject count")?;
        tx.commit().context("failed to commit rejected records")?;
        Ok(())
    }

    /// Load all feature rows for a run, ordered by (player_key, year, role).
    pub fn load_feature_rows(&self, run_id: &str) -> Result<Vec<FeatureRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT player_key, year, role, position, features, provenance, flags
                 FROM feature_rows WHERE run_id = ?1
                 ORDER BY player_key, year, role",
            )
            .context("failed to prepare feature row query")?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                let key: String = row.get(0)?;
                let year: u16 = row.get(1)?;
                let role: String = row.get(2)?;
                let position: Option<String> = row.get(3)?;
                let features: String = row.get(4)?;
                let provenance: String = row.get(5)?;
                let flags: String = row.get(6)?;
                Ok((key, year, role, position, features, provenance, flags))
            })
            .context("failed to query feature rows")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map feature rows")?;

        let mut out = Vec::with_capacity(rows.len());
        for (key, year, role, position, features, provenance, flags) in rows {
            let role = role_from_text(&role)
                .with_context(|| format!("unknown role `{role}` in feature store"))?;
            let features: std::collections::BTreeMap<String, f64> =
                serde_json::from_str(&features)
                    .context("failed to deserialize feature values")?;
            let provenance: std::collections::BTreeMap<String, Provenance> =
                serde_json::from_str(&provenance)
                    .context("failed to deserialize feature provenance")?;
            let flags: QualityFlags =
                serde_json::from_str(&flags).context("failed to deserialize quality flags")?;
            out.push(FeatureRow {
                key: PlayerKey::new(key),
                year,
                role,
                position,
                features,
                provenance,
                flags,
            });
        }
        Ok(out)
    }

    /// List all run ids, most recent first.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT run_id FROM runs ORDER BY started_at DESC, run_id DESC")
            .context("failed to prepare run list query")?;
        let runs = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query runs")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map run rows")?;
        Ok(runs)
    }
}

/// Generate a run id from the current UTC time, e.g. `run-20260828-153045`.
pub fn generate_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"))
}

fn role_text(role: Role) -> &'static str {
    match role {
        Role::Batter => "batter",
        Role::Pitcher => "pitcher",
    }
}

fn role_from_text(text: &str) -> Option<Role> {
    match text {
        "batter" => Some(Role::Batter),
        "pitcher" => Some(Role::Pitcher),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
