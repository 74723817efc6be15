//! Identity resolution — who the conversation belongs to
//!
//! An authenticated user id always wins. Otherwise a guest token is read
//! from the store, or generated and written once if absent. When the store
//! cannot be used, an ephemeral token covers the current view only.

use sprout_core::models::ConversationIdentity;
use sprout_core::store::{KeyValueStore, GUEST_TOKEN_KEY};
use std::sync::Arc;
use uuid::Uuid;

pub struct IdentityResolver {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Resolve the active identity. `authenticated` is the user id supplied
    /// by the auth subsystem, if any.
    ///
    /// A stored guest token is never discarded or merged when a user signs
    /// in; it is reported in `previous_guest` and resumes after sign-out.
    pub fn resolve(&self, authenticated: Option<&str>) -> ConversationIdentity {
        let stored_guest = match self.store.get(GUEST_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Identity store unreadable");
                None
            }
        };

        if let Some(user_id) = authenticated.filter(|id| !id.is_empty()) {
            if let Some(ref guest) = stored_guest {
                tracing::info!(
                    guest = %guest,
                    "Signed-in user has a guest conversation on this profile; leaving it untouched"
                );
            }
            return ConversationIdentity::authenticated(user_id, stored_guest);
        }

        if let Some(token) = stored_guest {
            return ConversationIdentity::guest(token, true);
        }

        let token = new_guest_token();
        match self.store.set(GUEST_TOKEN_KEY, &token) {
            Ok(()) => {
                tracing::info!(guest = %token, "Issued new guest identity");
                ConversationIdentity::guest(token, true)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Guest token could not be stored; conversation will not resume after reload"
                );
                ConversationIdentity::guest(token, false)
            }
        }
    }
}

fn new_guest_token() -> String {
    format!("guest-{}", Uuid::new_v4().simple())
}
