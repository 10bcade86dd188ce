/// Application name
pub const APP_NAME: &str = "Kinship";

/// Default page size for user listings
pub const USERS_BATCH: u32 = 15;

/// Default page size for friend, suggestion and request listings
pub const FRIENDS_BATCH: u32 = 20;

/// Default page size for a user's chat inbox
pub const CHATS_BATCH: u32 = 15;

/// Default page size for message listings
pub const MESSAGES_BATCH: u32 = 50;

/// Upper bound applied to any caller-supplied `take`
pub const MAX_PAGE_SIZE: u32 = 100;

/// Blob store folder for profile pictures
pub const PROFILE_PICTURES_FOLDER: &str = "profile_pictures";

/// Blob store folder for group chat icons
pub const GROUP_ICONS_FOLDER: &str = "group_icons";

/// Display name written over a soft-deleted account
pub const DELETED_USER_NAME: &str = "Deleted User";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
