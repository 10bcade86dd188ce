pub mod constants;
pub mod error;
pub mod pagination;
pub mod types;

pub use error::CursorError;
pub use pagination::{ChatCursor, Page, PageInfo, PageRequest};
pub use types::{Caller, ChatKind};
