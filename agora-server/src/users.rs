use std::collections::BTreeSet;

use agora_common::non_api_structs::{Session, UserRecord};
use agora_common::{Account, NewAccount, Registration, UserId};
use chrono::Utc;
use sled::{Db, Tree};
use tracing::info;
use uuid::Uuid;

use crate::store::{claim, get, put, release, scan};
use crate::{AppError, Result};

/// Account lookups the social graph depends on.
pub trait Directory: Send + Sync {
    fn account(&self, user: &UserId) -> Result<Option<Account>>;
    fn accounts(&self) -> Result<Vec<Account>>;

    fn exists(&self, user: &UserId) -> Result<bool> {
        Ok(self.account(user)?.is_some())
    }
    fn is_private(&self, user: &UserId) -> Result<bool> {
        Ok(self.account(user)?.map_or(false, |account| account.private))
    }
}

#[derive(Clone)]
pub struct Users {
    tree: Tree,
    usernames: Tree,
    sessions: Tree,
}

impl Users {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
            sessions: db.open_tree("sessions")?,
        })
    }

    pub fn register(&self, new: NewAccount) -> Result<Registration> {
        let username = new.username.trim().to_string();
        validate_username(&username)?;
        let id = UserId(Uuid::new_v4().to_string());
        let key = username.to_lowercase();
        if claim(&self.usernames, &key, &id.0)?.is_some() {
            return Err(AppError::Conflict(format!("username {username} is taken")));
        }
        let record = UserRecord {
            id: id.clone(),
            username,
            private: new.private,
            interests: normalize_interests(new.interests),
            created_at: Utc::now(),
        };
        let token = match self.store_account(&record) {
            Ok(token) => token,
            Err(err) => {
                self.abandon_registration(&id, &key)?;
                return Err(err);
            }
        };
        info!(user = %id, username = %record.username, "registered account");
        Ok(Registration {
            account: Account::from(&record),
            token,
        })
    }

    /// Frees a username claimed by a registration that failed to complete.
    fn abandon_registration(&self, id: &UserId, username_key: &str) -> Result<()> {
        self.tree.remove(id.0.as_bytes())?;
        release(&self.usernames, username_key, &id.0)
    }

    fn store_account(&self, record: &UserRecord) -> Result<String> {
        put(&self.tree, record.id.0.as_bytes(), record)?;
        self.issue_session(&record.id)
    }

    pub fn issue_session(&self, user: &UserId) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        put(&self.sessions, token.as_bytes(), &Session {
            user: user.clone(),
            issued_at: Utc::now(),
        })?;
        Ok(token)
    }

    pub fn authenticate(&self, token: &str) -> Result<UserId> {
        let session: Session = get(&self.sessions, token.as_bytes())?.ok_or(AppError::Unauthorized)?;
        Ok(session.user)
    }

    pub fn set_privacy(&self, user: &UserId, private: bool) -> Result<Account> {
        self.record_mut(user, |record| record.private = private)
    }

    pub fn set_interests(&self, user: &UserId, interests: BTreeSet<String>) -> Result<Account> {
        let interests = normalize_interests(interests);
        self.record_mut(user, |record| record.interests = interests.clone())
    }

    fn record_mut(&self, user: &UserId, func: impl Fn(&mut UserRecord)) -> Result<Account> {
        let key = user.0.as_bytes();
        loop {
            let current = self.tree.get(key)?.ok_or_else(|| AppError::NotFound(format!("user {user}")))?;
            let mut record: UserRecord = serde_json::from_slice(&current)?;
            func(&mut record);
            let next = serde_json::to_vec(&record)?;
            if self.tree.compare_and_swap(key, Some(current), Some(next))?.is_ok() {
                return Ok(Account::from(&record));
            }
        }
    }
}

impl Directory for Users {
    fn account(&self, user: &UserId) -> Result<Option<Account>> {
        Ok(get::<UserRecord>(&self.tree, user.0.as_bytes())?.as_ref().map(Account::from))
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        Ok(scan::<UserRecord>(&self.tree)?.iter().map(Account::from).collect())
    }
}

fn validate_username(username: &str) -> Result<()> {
    let valid_chars = username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if username.is_empty() || username.len() > 32 || !valid_chars {
        return Err(AppError::Validation(format!(
            "username {username:?} must be 1-32 characters of letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

fn normalize_interests(interests: BTreeSet<String>) -> BTreeSet<String> {
    interests
        .into_iter()
        .map(|interest| interest.trim().to_lowercase())
        .filter(|interest| !interest.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Users {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Users::new(&db).unwrap()
    }

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn register_then_authenticate() -> anyhow::Result<()> {
        let users = users();
        let registration = users.register(new_account("malek"))?;
        assert_eq!(users.authenticate(&registration.token)?, registration.account.id);
        assert!(matches!(users.authenticate("nope"), Err(AppError::Unauthorized)));
        assert!(users.exists(&registration.account.id)?);
        assert!(!users.is_private(&registration.account.id)?);
        Ok(())
    }

    #[test]
    fn usernames_are_unique_case_insensitively() -> anyhow::Result<()> {
        let users = users();
        users.register(new_account("Lyuma"))?;
        assert!(matches!(users.register(new_account("lyuma")), Err(AppError::Conflict(_))));
        assert_eq!(users.accounts()?.len(), 1);
        Ok(())
    }

    #[test]
    fn abandoned_registration_frees_the_username() -> anyhow::Result<()> {
        let users = users();
        let ghost = UserId(Uuid::new_v4().to_string());
        claim(&users.usernames, "malek", &ghost.0)?;
        assert!(matches!(users.register(new_account("Malek")), Err(AppError::Conflict(_))));

        users.abandon_registration(&ghost, "malek")?;
        let registration = users.register(new_account("Malek"))?;
        assert!(users.exists(&registration.account.id)?);
        assert!(!users.exists(&ghost)?);
        Ok(())
    }

    #[test]
    fn rejects_malformed_usernames() {
        let users = users();
        assert!(matches!(users.register(new_account("")), Err(AppError::Validation(_))));
        assert!(matches!(users.register(new_account("a b")), Err(AppError::Validation(_))));
        assert!(matches!(users.register(new_account(&"x".repeat(33))), Err(AppError::Validation(_))));
    }

    #[test]
    fn privacy_and_interests_are_updated() -> anyhow::Result<()> {
        let users = users();
        let id = users.register(new_account("malek"))?.account.id;
        assert!(users.set_privacy(&id, true)?.private);
        assert!(users.is_private(&id)?);
        let interests = BTreeSet::from([String::from(" Rust "), String::from(""), String::from("VR")]);
        let account = users.set_interests(&id, interests)?;
        assert_eq!(account.interests, BTreeSet::from([String::from("rust"), String::from("vr")]));
        let ghost = UserId(String::from("ghost"));
        assert!(matches!(users.set_privacy(&ghost, true), Err(AppError::NotFound(_))));
        Ok(())
    }
}
