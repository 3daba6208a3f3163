use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub name: String,
    pub product_info: String,
    pub offer_info: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub product_info: String,
    pub offer_info: String,
}

/// Partial update; blank fields are ignored.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub product_info: Option<String>,
    pub offer_info: Option<String>,
}

impl ProjectUpdate {
    /// Trims every field and drops the blank ones.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        ProjectUpdate {
            name: keep(self.name),
            product_info: keep(self.product_info),
            offer_info: keep(self.offer_info),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.product_info.is_none() && self.offer_info.is_none()
    }
}
