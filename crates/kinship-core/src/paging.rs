use kinship_shared::PageRequest;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Decode an id cursor. A cursor that is present but unparsable is a
/// client error, never "start from the beginning".
pub(crate) fn id_cursor(page: &PageRequest) -> Result<Option<Uuid>> {
    page.cursor()
        .map(|raw| {
            Uuid::parse_str(raw.trim())
                .map_err(|_| CoreError::bad_request(format!("Invalid cursor '{raw}'")))
        })
        .transpose()
}

/// Rows to fetch for a page of `limit`: one extra to detect a next page.
pub(crate) fn overfetch(limit: u32) -> u32 {
    limit + 1
}
