//! SQLite persistence for sessions.
//!
//! A session round-trips through a four-table single-file database:
//! `metadata`, `state`, `trajectory`, and `artifacts`. Saving writes the
//! whole session into a temp file in one transaction, fsyncs, then renames
//! over the target, so a failed save never leaves a partial file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::info;

use super::error::{Result, SessionError};
use super::{Session, SCHEMA_VERSION};
use crate::types::{EntryType, TrajectoryEntry};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS state (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS trajectory (
    seq_num INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    content BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS artifacts (
    name TEXT PRIMARY KEY,
    data BLOB NOT NULL
);
";

impl Session {
    /// Save the session to a single-file SQLite database at `path`.
    ///
    /// Overwrites an existing file. On failure the target is untouched and
    /// the temp file is removed. Saving records nothing in the trajectory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        if tmp.exists() {
            fs::remove_file(&tmp).map_err(|e| SessionError::io(&tmp, e))?;
        }

        let result = self.write_to(&tmp).and_then(|()| {
            let file = fs::File::open(&tmp).map_err(|e| SessionError::io(&tmp, e))?;
            file.sync_all().map_err(|e| SessionError::io(&tmp, e))?;
            fs::rename(&tmp, path).map_err(|e| SessionError::io(path, e))
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        } else {
            info!(
                session_id = self.session_id(),
                path = %path.display(),
                entries = self.trajectory().len(),
                "session saved"
            );
        }
        result
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;

        for (key, value) in [
            ("session_id", self.session_id().to_string()),
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("max_artifact_size", self.max_artifact_size().to_string()),
            ("state_version", self.state_version().to_string()),
        ] {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        for (key, value) in self.state() {
            let encoded = serde_json::to_string(&value)
                .map_err(|e| SessionError::invalid_value(e.to_string()))?;
            tx.execute(
                "INSERT INTO state (key, value) VALUES (?1, ?2)",
                params![key, encoded],
            )?;
        }

        for entry in self.trajectory() {
            let content = serde_json::to_string(&entry.content)
                .map_err(|e| SessionError::invalid_value(e.to_string()))?;
            tx.execute(
                "INSERT INTO trajectory (seq_num, timestamp, agent_id, entry_type, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.seq_num as i64,
                    entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    entry.agent_id,
                    entry.entry_type.as_str(),
                    content,
                ],
            )?;
        }

        for name in self.list_artifacts() {
            let data = self.read_artifact(&name)?;
            tx.execute(
                "INSERT INTO artifacts (name, data) VALUES (?1, ?2)",
                params![name, data],
            )?;
        }

        tx.commit()?;
        conn.close().map_err(|(_, e)| SessionError::from(e))?;
        Ok(())
    }

    /// Load a session from a file previously written by [`Session::save`].
    ///
    /// Restores the id, limits, state, trajectory (exact sequence numbers
    /// and timestamps), and artifacts. A failed load yields no partial
    /// session. Loading records nothing in the trajectory; the next append
    /// continues numbering where the file left off.
    pub fn load(path: &Path) -> Result<Session> {
        fs::metadata(path).map_err(|e| SessionError::io(path, e))?;

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let metadata = load_metadata(&conn)?;
        let schema_version: i64 = metadata_int(&metadata, "schema_version")?;
        if schema_version != SCHEMA_VERSION {
            return Err(SessionError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: schema_version,
            });
        }

        let session_id = metadata
            .get("session_id")
            .cloned()
            .ok_or_else(|| SessionError::corrupt("metadata missing session_id"))?;
        let max_artifact_size: u64 = metadata_int(&metadata, "max_artifact_size")?;
        let state_version: u64 = metadata_int(&metadata, "state_version")?;

        let state = load_state(&conn)?;
        let trajectory = load_trajectory(&conn)?;
        let artifacts = load_artifacts(&conn)?;

        info!(
            %session_id,
            path = %path.display(),
            entries = trajectory.len(),
            "session loaded"
        );
        Ok(Session::restore(
            session_id,
            max_artifact_size,
            state,
            state_version,
            trajectory,
            artifacts,
        ))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn load_metadata(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM metadata")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut metadata = BTreeMap::new();
    for row in rows {
        let (key, value) = row?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

fn metadata_int<T: FromStr>(metadata: &BTreeMap<String, String>, key: &str) -> Result<T> {
    metadata
        .get(key)
        .ok_or_else(|| SessionError::corrupt(format!("metadata missing {key}")))?
        .parse()
        .map_err(|_| SessionError::corrupt(format!("metadata {key} is not an integer")))
}

fn load_state(conn: &Connection) -> Result<BTreeMap<String, Value>> {
    let mut stmt = conn.prepare("SELECT key, value FROM state")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut state = BTreeMap::new();
    for row in rows {
        let (key, encoded) = row?;
        let value = serde_json::from_str(&encoded)
            .map_err(|e| SessionError::corrupt(format!("state value for '{key}': {e}")))?;
        state.insert(key, value);
    }
    Ok(state)
}

fn load_trajectory(conn: &Connection) -> Result<Vec<TrajectoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT seq_num, timestamp, agent_id, entry_type, content
         FROM trajectory ORDER BY seq_num",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut trajectory = Vec::new();
    for row in rows {
        let (seq_num, timestamp, agent_id, entry_type, content) = row?;

        let expected = trajectory.len() as i64 + 1;
        if seq_num != expected {
            return Err(SessionError::corrupt(format!(
                "trajectory sequence gap: expected {expected}, found {seq_num}"
            )));
        }

        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| SessionError::corrupt(format!("entry {seq_num} timestamp: {e}")))?
            .with_timezone(&Utc);
        let entry_type = EntryType::from_str(&entry_type)
            .map_err(|e| SessionError::corrupt(format!("entry {seq_num}: {e}")))?;
        let content: Value = serde_json::from_str(&content)
            .map_err(|e| SessionError::corrupt(format!("entry {seq_num} content: {e}")))?;

        trajectory.push(TrajectoryEntry {
            seq_num: seq_num as u64,
            timestamp,
            agent_id,
            entry_type,
            content,
        });
    }
    Ok(trajectory)
}

fn load_artifacts(conn: &Connection) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut stmt = conn.prepare("SELECT name, data FROM artifacts")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;

    let mut artifacts = BTreeMap::new();
    for row in rows {
        let (name, data) = row?;
        artifacts.insert(name, data);
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use crate::types::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn session_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("session.db")
    }

    #[test]
    fn save_load_round_trip_preserves_everything() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        let mut session = Session::with_options(SessionOptions {
            max_artifact_size: Some(4096),
            ..Default::default()
        });
        session.set("n", 42).unwrap();
        session
            .set("nested", json!({"list": [1, 2, {"deep": null}]}))
            .unwrap();
        session.write_artifact("f.bin", &[0x00, 0x01, 0x02]).unwrap();
        session
            .append("worker", EntryType::Custom, json!({"note": "hi"}))
            .unwrap();

        session.save(&path).unwrap();
        let loaded = Session::load(&path).unwrap();

        assert_eq!(loaded.session_id(), session.session_id());
        assert_eq!(loaded.max_artifact_size(), 4096);
        assert_eq!(loaded.state_version(), session.state_version());
        assert_eq!(loaded.state(), session.state());
        assert_eq!(loaded.trajectory(), session.trajectory());
        assert_eq!(loaded.read_artifact("f.bin").unwrap(), &[0x00, 0x01, 0x02]);
    }

    #[test]
    fn loaded_session_continues_sequence_numbering() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        let mut session = Session::new();
        session.set("k", "v").unwrap();
        session.save(&path).unwrap();

        let mut loaded = Session::load(&path).unwrap();
        let entry = loaded
            .append("worker", EntryType::Custom, json!({}))
            .unwrap();
        assert_eq!(entry.seq_num, session.trajectory().len() as u64 + 1);
    }

    #[test]
    fn save_overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        let mut first = Session::new();
        first.set("owner", "first").unwrap();
        first.save(&path).unwrap();

        let mut second = Session::new();
        second.set("owner", "second").unwrap();
        second.save(&path).unwrap();

        let loaded = Session::load(&path).unwrap();
        assert_eq!(loaded.session_id(), second.session_id());
        assert_eq!(loaded.get("owner"), Some(json!("second")));
    }

    #[test]
    fn save_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        Session::new().save(&path).unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_into_missing_directory_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("no/such/dir/session.db");

        let err = Session::new().save(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PersistenceError);
        assert!(!path.exists());
    }

    #[test]
    fn load_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let err = Session::load(&tmp.path().join("absent.db")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PersistenceError);
    }

    #[test]
    fn load_rejects_schema_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        Session::new().save(&path).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE metadata SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = Session::load(&path).unwrap_err();
        assert!(matches!(
            err,
            SessionError::SchemaMismatch {
                expected: 1,
                actual: 99
            }
        ));
    }

    #[test]
    fn load_rejects_unknown_entry_type() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        Session::new().save(&path).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE trajectory SET entry_type = 'time_travel' WHERE seq_num = 1",
            [],
        )
        .unwrap();
        drop(conn);

        let err = Session::load(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PersistenceError);
        assert!(err.to_string().contains("time_travel"));
    }

    #[test]
    fn load_rejects_sequence_gaps() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        let mut session = Session::new();
        session.set("k", "v").unwrap();
        session.save(&path).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE trajectory SET seq_num = 5 WHERE seq_num = 2", [])
            .unwrap();
        drop(conn);

        let err = Session::load(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PersistenceError);
    }

    #[test]
    fn load_rejects_missing_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = session_path(&tmp);

        Session::new().save(&path).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute("DELETE FROM metadata WHERE key = 'session_id'", [])
            .unwrap();
        drop(conn);

        let err = Session::load(&path).unwrap_err();
        assert!(err.to_string().contains("session_id"));
    }
}
