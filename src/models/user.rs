use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deletion_requested_at: Option<OffsetDateTime>,
}

impl User {
    /// Name used to sign generated messages.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.deletion_requested_at.is_some()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_named(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            password_hash: "hash".into(),
            name: name.into(),
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
            deletion_requested_at: None,
        }
    }

    #[test]
    fn first_name_takes_leading_word() {
        assert_eq!(user_named("Jane Doe").first_name(), "Jane");
        assert_eq!(user_named("  Prince ").first_name(), "Prince");
        assert_eq!(user_named("").first_name(), "");
    }

    #[test]
    fn public_user_never_serializes_password_hash() {
        let user = user_named("Jane Doe");
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        let public = PublicUser::from(&user);
        assert_eq!(public.email, "a@example.com");
    }
}
