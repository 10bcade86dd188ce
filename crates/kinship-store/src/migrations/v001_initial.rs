//! v001 -- Initial schema creation.
//!
//! Creates `users`, `friendships`, `friend_requests`, `one_on_one_chats`,
//! `group_chats`, `group_members` and `messages`, plus the `friend_edges`
//! view that reads a friendship from either endpoint.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                  TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    email               TEXT NOT NULL UNIQUE,       -- case-sensitive as stored
    password_hash       TEXT NOT NULL,
    name                TEXT NOT NULL,
    bio                 TEXT,
    profile_picture_url TEXT,
    is_deleted          INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    deleted_at          TEXT,
    created_at          TEXT NOT NULL,              -- RFC-3339, microseconds, UTC
    updated_at          TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Friendships: one row per undirected edge.
-- (user_id, friend_id) puts friend_id in user_id's friendIds and
-- user_id in friend_id's friendOfIds.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    user_id    TEXT NOT NULL,
    friend_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    CHECK (user_id <> friend_id),
    FOREIGN KEY (user_id)   REFERENCES users(id),
    FOREIGN KEY (friend_id) REFERENCES users(id)
);

-- at most one edge per unordered pair, whichever side initiated it
CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
    ON friendships(min(user_id, friend_id), max(user_id, friend_id));
CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id);

CREATE VIEW IF NOT EXISTS friend_edges (user_id, friend_id) AS
    SELECT user_id, friend_id FROM friendships
    UNION ALL
    SELECT friend_id, user_id FROM friendships;

-- ----------------------------------------------------------------
-- Friend requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    id          TEXT PRIMARY KEY NOT NULL,
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('PENDING', 'ACCEPTED', 'REJECTED')),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    CHECK (sender_id <> receiver_id),
    FOREIGN KEY (sender_id)   REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

-- at most one PENDING request per unordered pair
CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pending_pair
    ON friend_requests(min(sender_id, receiver_id), max(sender_id, receiver_id))
    WHERE status = 'PENDING';
CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
    ON friend_requests(receiver_id, status, created_at DESC);

-- ----------------------------------------------------------------
-- One-on-one chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS one_on_one_chats (
    id                      TEXT PRIMARY KEY NOT NULL,
    initiator_id            TEXT NOT NULL,
    participant_id          TEXT NOT NULL,
    vanish_mode             INTEGER NOT NULL DEFAULT 0,
    last_message_at         TEXT NOT NULL,
    deleted_for_initiator   TEXT,
    deleted_for_participant TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,

    CHECK (initiator_id <> participant_id),
    FOREIGN KEY (initiator_id)   REFERENCES users(id),
    FOREIGN KEY (participant_id) REFERENCES users(id)
);

-- at most one chat per unordered pair
CREATE UNIQUE INDEX IF NOT EXISTS idx_one_on_one_chats_pair
    ON one_on_one_chats(min(initiator_id, participant_id), max(initiator_id, participant_id));

-- ----------------------------------------------------------------
-- Group chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_chats (
    id                TEXT PRIMARY KEY NOT NULL,
    name              TEXT NOT NULL,
    owner_id          TEXT NOT NULL,
    group_description TEXT,
    group_icon_url    TEXT NOT NULL,
    last_message_at   TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS group_members (
    chat_id  TEXT NOT NULL,
    user_id  TEXT NOT NULL,
    added_at TEXT NOT NULL,

    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES group_chats(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

-- ----------------------------------------------------------------
-- Messages (append-only; deletion clears content)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                 TEXT PRIMARY KEY NOT NULL,
    content            TEXT NOT NULL,
    sender_id          TEXT NOT NULL,
    one_on_one_chat_id TEXT,
    group_chat_id      TEXT,
    is_deleted         INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,

    CHECK ((one_on_one_chat_id IS NULL) <> (group_chat_id IS NULL)),
    FOREIGN KEY (sender_id)          REFERENCES users(id),
    FOREIGN KEY (one_on_one_chat_id) REFERENCES one_on_one_chats(id),
    FOREIGN KEY (group_chat_id)      REFERENCES group_chats(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_one_on_one
    ON messages(one_on_one_chat_id, created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_messages_group
    ON messages(group_chat_id, created_at DESC, id DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
