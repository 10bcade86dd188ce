//! The user directory: registration, profile reads and edits, and account
//! deletion.

use std::sync::Arc;

use kinship_shared::constants::{PROFILE_PICTURES_FOLDER, USERS_BATCH};
use kinship_shared::{Caller, Page, PageRequest};
use kinship_store::users::UserUpdate;
use kinship_store::{NewUser, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::blobs::{discard, BlobStore, Upload};
use crate::error::{CoreError, OrNotFound, Result};
use crate::paging::{id_cursor, overfetch};
use crate::SharedDatabase;

/// Account fields supplied at registration. The password arrives already
/// hashed by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub bio: Option<String>,
}

/// Profile edits. `bio: Some(None)` clears the bio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub bio: Option<Option<String>>,
}

pub struct UserDirectory<B> {
    db: SharedDatabase,
    blobs: Arc<B>,
}

impl<B: BlobStore> UserDirectory<B> {
    pub fn new(db: SharedDatabase, blobs: Arc<B>) -> Self {
        Self { db, blobs }
    }

    pub async fn register_user(&self, reg: Registration, picture: Option<Upload>) -> Result<User> {
        let email = reg.email.trim().to_string();
        let name = reg.name.trim().to_string();
        if email.is_empty() {
            return Err(CoreError::bad_request("Email is required"));
        }
        if name.is_empty() {
            return Err(CoreError::bad_request("Name is required"));
        }
        if reg.password_hash.is_empty() {
            return Err(CoreError::bad_request("Password hash is required"));
        }

        {
            let db = self.db.lock().await;
            if db.store().find_user_by_email(&email)?.is_some() {
                return Err(CoreError::conflict("Email already in use"));
            }
        }

        let picture_url = match &picture {
            Some(upload) => Some(self.blobs.upload(upload, PROFILE_PICTURES_FOLDER).await?),
            None => None,
        };

        let new = NewUser {
            email,
            password_hash: reg.password_hash,
            name,
            bio: reg.bio,
            profile_picture_url: picture_url.clone(),
        };
        let inserted = self.db.lock().await.transaction(|s| {
            s.insert_user(&new).map_err(|e| {
                if e.is_unique_violation() {
                    CoreError::conflict("Email already in use")
                } else {
                    e.into()
                }
            })
        });

        match inserted {
            Ok(user) => {
                info!(user = %user.id, "user registered");
                Ok(user)
            }
            Err(e) => {
                if let Some(url) = &picture_url {
                    discard(self.blobs.as_ref(), url).await;
                }
                Err(e)
            }
        }
    }

    /// A non-deleted user.
    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        let db = self.db.lock().await;
        db.store().get_active_user(user_id).or_not_found("User not found")
    }

    /// Non-deleted users in id order with an optional name filter.
    pub async fn list_users(&self, page: &PageRequest, search: Option<&str>) -> Result<Page<User>> {
        let after = id_cursor(page)?;
        let limit = page.limit(USERS_BATCH);

        let db = self.db.lock().await;
        let store = db.store();
        let rows = store.list_users(search, after, overfetch(limit))?;
        let total = store.count_users(search)?;

        debug!(count = rows.len(), "listed users");
        Ok(Page::from_overfetch(rows, limit, |u| u.id.to_string(), Some(total)))
    }

    pub async fn update_user(
        &self,
        caller: &Caller,
        user_id: Uuid,
        patch: UserPatch,
        picture: Option<Upload>,
    ) -> Result<User> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only update your own profile"));
        }
        let name = match patch.name {
            Some(name) if name.trim().is_empty() => {
                return Err(CoreError::bad_request("Name cannot be empty"));
            }
            other => other.map(|n| n.trim().to_string()),
        };

        let previous_picture = self.get_user(user_id).await?.profile_picture_url;

        let new_picture = match &picture {
            Some(upload) => Some(self.blobs.upload(upload, PROFILE_PICTURES_FOLDER).await?),
            None => None,
        };

        let update = UserUpdate {
            name,
            bio: patch.bio,
            profile_picture_url: new_picture.clone().map(Some),
        };
        let updated = self
            .db
            .lock()
            .await
            .transaction(|s| s.update_user(user_id, &update).or_not_found("User not found"));

        match updated {
            Ok(user) => {
                if let (Some(_), Some(old)) = (&new_picture, &previous_picture) {
                    discard(self.blobs.as_ref(), old).await;
                }
                info!(user = %user_id, "profile updated");
                Ok(user)
            }
            Err(e) => {
                if let Some(url) = &new_picture {
                    discard(self.blobs.as_ref(), url).await;
                }
                Err(e)
            }
        }
    }

    /// Soft-delete the caller's account and withdraw its pending friend
    /// requests. Friend edges stay in place.
    pub async fn delete_user(&self, caller: &Caller, user_id: Uuid) -> Result<()> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only delete your own account"));
        }

        let (picture, withdrawn) = self.db.lock().await.transaction(|s| {
            let user = s.get_active_user(user_id).or_not_found("User not found")?;
            let withdrawn = s.delete_pending_requests_for(user_id)?;
            s.soft_delete_user(user_id, kinship_store::store::now())?;
            Ok::<_, CoreError>((user.profile_picture_url, withdrawn))
        })?;

        if let Some(url) = &picture {
            discard(self.blobs.as_ref(), url).await;
        }
        info!(user = %user_id, withdrawn, "account deleted");
        Ok(())
    }
}
