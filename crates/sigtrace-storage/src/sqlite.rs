//! SQLite implementation of [`SignatureStore`].
//!
//! [`SqliteStore`] persists contracts and the call log in a SQLite database
//! with WAL mode and automatic schema migrations. Contracts and logged calls
//! are stored as JSON TEXT columns via serde_json.
//!
//! All queries are free functions over a `&Connection`, shared by the store
//! itself and by [`SqliteTransaction`], the view handed to atomic work.

use rusqlite::{params, Connection, OptionalExtension};

use sigtrace_core::{CallObservation, Contract, GemInfo, MethodIdentity, SignatureInfo};

use crate::error::StorageError;
use crate::hash::call_fingerprint;
use crate::traits::{AtomicWork, SignatureStore};

/// SQLite-backed implementation of [`SignatureStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }
}

/// A [`SignatureStore`] view over an open SQLite transaction.
pub struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn read_signature(
    conn: &Connection,
    method: &MethodIdentity,
) -> Result<Option<SignatureInfo>, StorageError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT contract_json FROM signatures WHERE owner = ?1 AND method_name = ?2",
            params![method.owner, method.name],
            |row| row.get(0),
        )
        .optional()?;
    match json {
        Some(json) => {
            let contract: Contract = serde_json::from_str(&json)?;
            Ok(Some(SignatureInfo::new(method.clone(), contract)))
        }
        None => Ok(None),
    }
}

fn write_signature(conn: &Connection, info: &SignatureInfo) -> Result<(), StorageError> {
    info.contract.validate()?;
    let contract_json = serde_json::to_string(&info.contract)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO signatures (owner, method_name, contract_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner, method_name) DO UPDATE SET
             contract_json = excluded.contract_json,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    )?;
    stmt.execute(params![info.method.owner, info.method.name, contract_json])?;
    Ok(())
}

fn read_registered_methods(
    conn: &Connection,
    owner: &str,
) -> Result<Vec<MethodIdentity>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT method_name FROM signatures WHERE owner = ?1 ORDER BY method_name",
    )?;
    let rows = stmt.query_map(params![owner], |row| row.get::<_, String>(0))?;
    let mut methods = Vec::new();
    for name in rows {
        methods.push(MethodIdentity::new(owner, name?));
    }
    Ok(methods)
}

fn write_call(conn: &Connection, call: &CallObservation) -> Result<bool, StorageError> {
    let call_json = serde_json::to_string(call)?;
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO call_log
             (fingerprint, owner, method_name, call_json, gem_name, gem_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let inserted = stmt.execute(params![
        call_fingerprint(call),
        call.method.owner,
        call.method.name,
        call_json,
        call.gem.as_ref().map(|g| g.name.as_str()),
        call.gem.as_ref().map(|g| g.version.as_str()),
    ])?;
    Ok(inserted == 1)
}

fn read_gem_versions(conn: &Connection, name: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT gem_version FROM call_log
         WHERE gem_name = ?1 AND gem_version IS NOT NULL
         ORDER BY gem_version",
    )?;
    let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for version in rows {
        versions.push(version?);
    }
    Ok(versions)
}

fn read_gem_calls(conn: &Connection, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT call_json FROM call_log WHERE gem_name = ?1 AND gem_version = ?2 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![gem.name, gem.version], |row| {
        row.get::<_, String>(0)
    })?;
    let mut calls: Vec<CallObservation> = Vec::new();
    for json in rows {
        calls.push(serde_json::from_str(&json?)?);
    }
    Ok(calls)
}

fn read_calls(
    conn: &Connection,
    method: &MethodIdentity,
) -> Result<Vec<CallObservation>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT call_json FROM call_log WHERE owner = ?1 AND method_name = ?2 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![method.owner, method.name], |row| {
        row.get::<_, String>(0)
    })?;
    let mut calls: Vec<CallObservation> = Vec::new();
    for json in rows {
        calls.push(serde_json::from_str(&json?)?);
    }
    Ok(calls)
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl SignatureStore for SqliteStore {
    fn get_signature(&self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError> {
        read_signature(&self.conn, method)
    }

    fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError> {
        write_signature(&self.conn, info)
    }

    fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError> {
        read_registered_methods(&self.conn, owner)
    }

    fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError> {
        write_call(&self.conn, call)
    }

    fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError> {
        read_calls(&self.conn, method)
    }

    fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError> {
        read_gem_versions(&self.conn, name)
    }

    fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
        read_gem_calls(&self.conn, gem)
    }

    fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        {
            let mut view = SqliteTransaction { conn: &tx };
            // Dropping `tx` without commit rolls back.
            work(&mut view)?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl SignatureStore for SqliteTransaction<'_> {
    fn get_signature(&self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError> {
        read_signature(self.conn, method)
    }

    fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError> {
        write_signature(self.conn, info)
    }

    fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError> {
        read_registered_methods(self.conn, owner)
    }

    fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError> {
        write_call(self.conn, call)
    }

    fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError> {
        read_calls(self.conn, method)
    }

    fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError> {
        read_gem_versions(self.conn, name)
    }

    fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
        read_gem_calls(self.conn, gem)
    }

    /// Already inside a transaction: runs `work` directly.
    fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError> {
        work(self)
    }
}
