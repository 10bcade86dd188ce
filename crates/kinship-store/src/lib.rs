//! # kinship-store
//!
//! SQLite persistence for the Kinship social backend.
//!
//! [`Database`] owns the `rusqlite::Connection` and runs migrations on open.
//! All typed queries live on [`Store`], a borrowed view that works the same
//! over a plain connection or an open transaction, so a multi-entity write
//! is just a closure handed to [`Database::transaction`].

pub mod database;
pub mod friend_requests;
pub mod friendships;
pub mod group_chats;
pub mod inbox;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod one_on_one_chats;
pub mod store;
pub mod users;

mod error;

pub use database::{Database, TxError};
pub use error::{Result, StoreError};
pub use models::*;
pub use store::Store;
