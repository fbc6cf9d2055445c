//! Pluggable session storage.
//!
//! The [`SessionStore`] trait abstracts over where the session record lives.
//!
//! Built-in stores:
//! * [`FileSessionStore`]: one checksummed binary file, replaced atomically (default).
//! * [`InMemorySessionStore`]: nothing touches the disk.
//! * [`SqliteSessionStore`]: SQLite (requires the `sqlite-session` Cargo feature).
//!
//! A record that is truncated, corrupted or written by another format
//! version loads as `None`, so the client falls back to a fresh handshake.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::session::Session;

// ─── Trait ────────────────────────────────────────────────────────────────────

pub trait SessionStore: Send + Sync {
    /// A missing record is `Ok(None)`, not an error.
    fn load(&self) -> io::Result<Option<Session>>;

    fn save(&self, session: &Session) -> io::Result<()>;

    /// Remove the stored record (e.g. on sign-out).
    fn delete(&self) -> io::Result<()>;

    /// Human-readable name of this store (for log messages).
    fn name(&self) -> &str;
}

fn decode_or_warn(bytes: &[u8], store: &str) -> Option<Session> {
    match Session::decode(bytes) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("[tgmedia] Ignoring stored session ({store}): {e}");
            None
        }
    }
}

// ─── FileSessionStore ─────────────────────────────────────────────────────────

pub struct FileSessionStore {
    path:  PathBuf,
    write: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> io::Result<Option<Session>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(decode_or_warn(&bytes, self.name())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, session: &Session) -> io::Result<()> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let tmp = self.temp_path();

        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }

        let result = (|| {
            let mut file = opts.open(&tmp)?;
            file.write_all(&session.encode())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        #[cfg(unix)]
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        tracing::debug!("[tgmedia] Session written to {}", self.path.display());
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str { "file" }
}

// ─── InMemorySessionStore ─────────────────────────────────────────────────────

/// Keeps the encoded record in memory, so it exercises the same codec as
/// the file store.
#[derive(Default)]
pub struct InMemorySessionStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self { Self::default() }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> io::Result<Option<Session>> {
        let lock = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lock.as_deref().and_then(|b| decode_or_warn(b, "in-memory")))
    }

    fn save(&self, session: &Session) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.encode());
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── SqliteSessionStore ───────────────────────────────────────────────────────

#[cfg(feature = "sqlite-session")]
pub use sqlite_store::SqliteSessionStore;

#[cfg(feature = "sqlite-session")]
mod sqlite_store {
    use super::*;
    use rusqlite::{Connection, OptionalExtension, params};

    fn sql_err(e: rusqlite::Error) -> io::Error {
        io::Error::other(e)
    }

    /// SQLite-backed store. The record is kept as one checksummed blob in a
    /// single-row `session` table.
    ///
    /// Enable with the `sqlite-session` Cargo feature.
    pub struct SqliteSessionStore {
        conn: Mutex<Connection>,
    }

    impl SqliteSessionStore {
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            let conn = Connection::open(path).map_err(sql_err)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS session (
                    id     INTEGER PRIMARY KEY CHECK (id = 1),
                    record BLOB    NOT NULL
                );",
            )
            .map_err(sql_err)?;
            Ok(Self { conn: Mutex::new(conn) })
        }
    }

    impl SessionStore for SqliteSessionStore {
        fn load(&self) -> io::Result<Option<Session>> {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let blob: Option<Vec<u8>> = conn
                .query_row("SELECT record FROM session WHERE id = 1", [], |row| row.get(0))
                .optional()
                .map_err(sql_err)?;
            Ok(blob.and_then(|b| decode_or_warn(&b, "sqlite")))
        }

        fn save(&self, session: &Session) -> io::Result<()> {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute(
                "INSERT OR REPLACE INTO session (id, record) VALUES (1, ?1)",
                params![session.encode()],
            )
            .map_err(sql_err)?;
            Ok(())
        }

        fn delete(&self) -> io::Result<()> {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute("DELETE FROM session", []).map_err(sql_err)?;
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }
}
