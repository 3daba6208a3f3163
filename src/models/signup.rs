use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
pub struct SignupPayload {
    pub email: String,
    pub password: String,
    pub name: String,
}
