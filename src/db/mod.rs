use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::types::{CoreError, CoreResult};

pub mod schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// An alias to the type for a pool of Diesel SQLite connections.
pub type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub type PooledConnection = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

error_chain! {
    foreign_links {
        Var(::std::env::VarError);
        ParseInt(::std::num::ParseIntError);
        Io(::std::io::Error);
        R2D2(r2d2::Error);
        Connection(::diesel::ConnectionError);
        Diesel(DieselError);
    }

    errors {
        Migration(reason: String) {
            description("migration failed")
            display("migration failed: {}", reason)
        }
        Cancelled {
            description("transaction cancelled")
            display("transaction cancelled before commit")
        }
    }
}

/// Per-connection settings applied whenever the pool hands out a connection.
#[derive(Debug)]
struct ConnectionPragmas {
    busy_timeout: Duration,
}

impl ConnectionPragmas {
    fn apply(&self, conn: &mut SqliteConnection) -> ::std::result::Result<(), DieselError> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        ))
    }
}

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> ::std::result::Result<(), diesel::r2d2::Error> {
        self.apply(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Handle to an open read transaction. Every query in the crate takes one of
/// these (or a `WriteTx`, which dereferences to it).
pub struct ReadTx<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ReadTx<'c> {
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }
}

/// Handle to an open write transaction.
pub struct WriteTx<'c>(ReadTx<'c>);

impl<'c> Deref for WriteTx<'c> {
    type Target = ReadTx<'c>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'c> DerefMut for WriteTx<'c> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Shared flag a request flips when its caller goes away. A write transaction
/// bound to a cancelled token rolls back instead of committing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Opens (creating if needed) the database file, applies pending
    /// migrations and builds the connection pool.
    pub fn open(config: &DbConfig) -> Result<Database> {
        if let Some(parent) = Path::new(&config.url).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let pragmas = ConnectionPragmas {
            busy_timeout: config.busy_timeout,
        };

        let mut conn = SqliteConnection::establish(&config.url)?;
        pragmas.apply(&mut conn)?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| ErrorKind::Migration(e.to_string()))?;
        if !applied.is_empty() {
            info!("applied {} migration(s) to {}", applied.len(), config.url);
        }

        let manager = ConnectionManager::<SqliteConnection>::new(config.url.as_str());
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(pragmas))
            .build(manager)?;

        Ok(Database { pool })
    }

    fn connection(&self) -> CoreResult<PooledConnection> {
        self.pool.get().map_err(|e| CoreError::Storage(e.into()))
    }

    /// Runs `f` inside a deferred transaction. Readers see a consistent
    /// snapshot and never block writers.
    pub fn read_tx<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut ReadTx<'_>) -> CoreResult<T>,
    {
        let mut pooled = self.connection()?;
        let conn: &mut SqliteConnection = &mut pooled;
        debug!("begin read transaction");
        conn.transaction(|conn| f(&mut ReadTx { conn }))
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction. Writers are serialized
    /// by the engine; an `Err` from `f` rolls everything back.
    pub fn write_tx<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTx<'_>) -> CoreResult<T>,
    {
        self.write_tx_until(&CancelToken::new(), f)
    }

    pub fn write_tx_until<T, F>(&self, cancel: &CancelToken, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTx<'_>) -> CoreResult<T>,
    {
        if cancel.is_cancelled() {
            return Err(Error::from(ErrorKind::Cancelled).into());
        }

        let mut pooled = self.connection()?;
        let conn: &mut SqliteConnection = &mut pooled;
        debug!("begin write transaction");
        conn.immediate_transaction(|conn| {
            let value = f(&mut WriteTx(ReadTx { conn }))?;
            if cancel.is_cancelled() {
                warn!("caller went away, rolling back write transaction");
                return Err(Error::from(ErrorKind::Cancelled).into());
            }
            Ok(value)
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::ops::Deref;

    use diesel::prelude::*;
    use rstest::fixture;
    use tempfile::TempDir;

    use super::schema::users;
    use super::{Database, WriteTx};
    use crate::config::DbConfig;
    use crate::id::next_id;
    use crate::types::UserId;

    /// A database living in a temporary directory, removed on drop.
    pub struct ScratchDb {
        db: Database,
        _dir: TempDir,
    }

    impl Deref for ScratchDb {
        type Target = Database;

        fn deref(&self) -> &Database {
            &self.db
        }
    }

    #[fixture]
    pub fn db() -> ScratchDb {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.sqlite");
        let db = Database::open(&DbConfig::new(path.to_str().unwrap())).unwrap();
        ScratchDb { db, _dir: dir }
    }

    pub fn user(tx: &mut WriteTx<'_>, username: &str) -> UserId {
        let id = next_id();
        diesel::insert_into(users::table)
            .values((
                users::id.eq(id),
                users::username.eq(username),
                users::email.eq(format!("{}@example.com", username)),
                users::password_hash.eq(b"not-a-hash".to_vec()),
                users::image.eq(format!("https://i.pravatar.cc/150?u={}", id)),
            ))
            .execute(tx.conn())
            .unwrap();
        id
    }
}
