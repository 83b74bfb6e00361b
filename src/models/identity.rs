use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated user a request acts on behalf of.
///
/// Resolved once by the auth middleware and passed explicitly to every store
/// operation, so ownership scoping never depends on ambient state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    pub user_id: Uuid,
}

impl CallerIdentity {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }

    /// Identity used when the server runs without configured tokens.
    pub fn local() -> Self {
        Self {
            user_id: Uuid::nil(),
        }
    }
}
