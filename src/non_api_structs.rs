use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Account, UserId};

/// Stored form of an account. Never sent over the wire directly.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub private: bool,
    pub interests: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for Account {
    fn from(record: &UserRecord) -> Self {
        Account {
            id: record.id.clone(),
            username: record.username.clone(),
            private: record.private,
            interests: record.interests.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Session {
    pub user: UserId,
    pub issued_at: DateTime<Utc>,
}
