use std::ops::Deref;

use rstest::fixture;
use tempfile::TempDir;

use conduit::config::DbConfig;
use conduit::users::utils::Sha256Hasher;
use conduit::users::{self, Registration};
use conduit::{Database, UserId, WriteTx};

pub struct TestDb {
    db: Database,
    _dir: TempDir,
}

impl Deref for TestDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

#[fixture]
pub fn db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conduit.sqlite");
    let db = Database::open(&DbConfig::new(path.to_str().unwrap())).unwrap();
    TestDb { db, _dir: dir }
}

pub fn hasher() -> Sha256Hasher {
    Sha256Hasher::new("integration")
}

pub fn register(tx: &mut WriteTx<'_>, username: &str) -> UserId {
    let registration = Registration {
        username: username.to_owned(),
        email: format!("{}@example.com", username),
        password: "hunter22".to_owned(),
    };
    users::register(tx, registration, &hasher()).unwrap().id
}
