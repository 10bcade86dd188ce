//! # kinship-core
//!
//! The managers behind the Kinship API. Each takes the acting [`Caller`]
//! explicitly, checks its preconditions against the store and performs
//! every multi-entity write inside one [`Database::transaction`].
//!
//! [`Caller`]: kinship_shared::Caller

pub mod blobs;
pub mod chats;
pub mod error;
pub mod friendship;
pub mod messages;
pub mod users;

mod paging;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use kinship_store::Database;
use tokio::sync::Mutex;

pub use blobs::{BlobError, BlobStore, MemoryBlobStore, Upload};
pub use chats::{ChatManager, GroupChatSettings, InboxEntry, MembersAdded, NewGroup, OneOnOneChatSettings};
pub use error::{CoreError, ErrorKind, Result};
pub use friendship::{FriendGraph, FriendRequestDecision, FriendshipStatus};
pub use messages::{MessageLedger, NewMessage};
pub use users::{Registration, UserDirectory, UserPatch};

/// The single database handle every manager shares.
pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn share(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}
