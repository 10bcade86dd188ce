//! Cursor-based pagination shared by every list operation.
//!
//! Queries fetch `take + 1` rows ordered by their sort key. When the extra
//! row comes back there is a next page and its cursor is the key of the
//! `take`-th row; the extra row itself is never returned. `total_count` is a
//! separate count query and may drift from the page under concurrent writes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_PAGE_SIZE;
use crate::error::CursorError;

/// Caller-supplied position and size of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    /// Opaque marker returned as `next_cursor` by the previous page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Requested page size; the list's default is used when absent or zero.
    #[serde(default)]
    pub take: Option<u32>,
}

impl PageRequest {
    pub fn new(cursor: Option<String>, take: Option<u32>) -> Self {
        Self { cursor, take }
    }

    pub fn first(take: u32) -> Self {
        Self {
            cursor: None,
            take: Some(take),
        }
    }

    pub fn after(cursor: impl Into<String>, take: u32) -> Self {
        Self {
            cursor: Some(cursor.into()),
            take: Some(take),
        }
    }

    /// Effective page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self, default: u32) -> u32 {
        match self.take {
            Some(0) | None => default,
            Some(n) => n,
        }
        .clamp(1, MAX_PAGE_SIZE)
    }

    /// The cursor, ignoring empty strings sent by sloppy clients.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    pub has_next_page: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    /// Build a page from a `take + 1` over-fetch.
    pub fn from_overfetch<F>(mut rows: Vec<T>, take: u32, cursor_of: F, total_count: Option<u64>) -> Self
    where
        F: Fn(&T) -> String,
    {
        let take = take as usize;
        let has_next_page = rows.len() > take;
        rows.truncate(take);
        let next_cursor = if has_next_page {
            rows.last().map(cursor_of)
        } else {
            None
        };

        Self {
            items: rows,
            pagination: PageInfo {
                total_count,
                has_next_page,
                next_cursor,
            },
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Composite sort key for the inbox, encoded as base64 JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCursor {
    pub last_message_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ChatCursor {
    pub fn encode(&self) -> String {
        // serializing a timestamp and a uuid cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(raw.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_marks_next_page() {
        let page = Page::from_overfetch(vec![1, 2, 3, 4], 3, |n| n.to_string(), Some(10));
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(page.pagination.has_next_page);
        assert_eq!(page.pagination.next_cursor.as_deref(), Some("3"));
        assert_eq!(page.pagination.total_count, Some(10));
    }

    #[test]
    fn short_fetch_is_last_page() {
        let page = Page::from_overfetch(vec![1, 2], 3, |n| n.to_string(), None);
        assert_eq!(page.len(), 2);
        assert!(!page.pagination.has_next_page);
        assert!(page.pagination.next_cursor.is_none());
    }

    #[test]
    fn exact_fetch_is_last_page() {
        let page = Page::from_overfetch(vec![1, 2, 3], 3, |n| n.to_string(), None);
        assert!(!page.pagination.has_next_page);
    }

    #[test]
    fn limit_uses_default_and_clamps() {
        assert_eq!(PageRequest::default().limit(15), 15);
        assert_eq!(PageRequest::first(0).limit(20), 20);
        assert_eq!(PageRequest::first(5).limit(20), 5);
        assert_eq!(PageRequest::first(10_000).limit(20), MAX_PAGE_SIZE);
    }

    #[test]
    fn empty_cursor_is_ignored() {
        let req = PageRequest::new(Some(String::new()), None);
        assert!(req.cursor().is_none());
    }

    #[test]
    fn chat_cursor_decodes_what_it_encodes() {
        let cursor = ChatCursor {
            last_message_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        assert_eq!(ChatCursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn garbage_chat_cursor_rejected() {
        assert!(ChatCursor::decode("%%%").is_err());
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(
            ChatCursor::decode(&not_json),
            Err(CursorError::Payload(_))
        ));
    }
}
