use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Read-only user directory record. Identity lifecycle is owned by an
/// upstream service; this API only looks users up to address notifications.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
}
