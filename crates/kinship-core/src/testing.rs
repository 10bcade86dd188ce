use kinship_store::{Database, NewUser};
use tempfile::TempDir;
use uuid::Uuid;

use crate::{share, SharedDatabase};

pub(crate) fn db() -> SharedDatabase {
    share(Database::open_in_memory().unwrap())
}

/// Two independent connections to one on-disk database, so writers can
/// contend for the SQLite lock the way separate server processes do.
pub(crate) fn twin_dbs(dir: &TempDir) -> (SharedDatabase, SharedDatabase) {
    let path = dir.path().join("kinship.db");
    let first = share(Database::open_at(&path).unwrap());
    let second = share(Database::open_at(&path).unwrap());
    (first, second)
}

pub(crate) async fn user(db: &SharedDatabase, name: &str) -> Uuid {
    db.lock()
        .await
        .store()
        .insert_user(&NewUser {
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            name: name.into(),
            bio: None,
            profile_picture_url: None,
        })
        .unwrap()
        .id
}

/// Write a friend edge directly, bypassing the request flow.
pub(crate) async fn befriend(db: &SharedDatabase, a: Uuid, b: Uuid) {
    db.lock().await.store().insert_friendship(a, b).unwrap();
}
