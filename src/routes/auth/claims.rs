use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token payload. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
