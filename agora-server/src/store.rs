//! Document access over sled trees.
//!
//! Every value is a JSON document keyed by its id. Writes to a single
//! document are atomic (compare-and-swap); nothing here spans documents.

use std::sync::Arc;

use agora_common::{SocialProfile, UserId};
use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{CompareAndSwapError, Db, Tree};
use tracing::debug;

use crate::users::Directory;
use crate::{AppError, Result};

pub fn get<T: DeserializeOwned>(tree: &Tree, key: impl AsRef<[u8]>) -> Result<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put<T: Serialize>(tree: &Tree, key: impl AsRef<[u8]>, value: &T) -> Result<()> {
    tree.insert(key.as_ref(), serde_json::to_vec(value)?)?;
    Ok(())
}

/// Inserts only if the key is free. Returns the id already stored otherwise.
pub fn claim(tree: &Tree, key: impl AsRef<[u8]>, value: &str) -> Result<Option<String>> {
    match tree.compare_and_swap(key, None as Option<&[u8]>, Some(value.as_bytes()))? {
        Ok(()) => Ok(None),
        Err(CompareAndSwapError { current, .. }) => Ok(current.map(|c| String::from_utf8_lossy(&c).into_owned())),
    }
}

/// Removes `key` only while it still maps to `value`.
pub fn release(tree: &Tree, key: impl AsRef<[u8]>, value: &str) -> Result<()> {
    let _ = tree.compare_and_swap(key, Some(value.as_bytes()), None as Option<&[u8]>)?;
    Ok(())
}

pub fn scan<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>> {
    tree.iter()
        .values()
        .map(|value| Ok(serde_json::from_slice(&value?)?))
        .collect()
}

/// Key of the uniqueness index for a directed (requester, recipient) pair.
pub fn pair_key(requester: &UserId, recipient: &UserId) -> String {
    format!("{requester}:{recipient}")
}

/// Key of the uniqueness index for an unordered pair; both directions map to
/// the same entry.
pub fn friend_pair_key(a: &UserId, b: &UserId) -> String {
    if a <= b {
        pair_key(a, b)
    } else {
        pair_key(b, a)
    }
}

#[derive(Clone)]
pub struct Profiles {
    tree: Tree,
    directory: Arc<dyn Directory>,
}

impl Profiles {
    pub fn new(db: &Db, directory: Arc<dyn Directory>) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree("profiles")?,
            directory,
        })
    }

    pub fn peek(&self, user: &UserId) -> Result<Option<SocialProfile>> {
        get(&self.tree, user.0.as_bytes())
    }

    /// Find-or-create. Losing a creation race to another request just returns
    /// the winner's document.
    pub fn get_or_create(&self, user: &UserId) -> Result<SocialProfile> {
        if !self.directory.exists(user)? {
            return Err(AppError::NotFound(format!("user {user}")));
        }
        if let Some(profile) = self.peek(user)? {
            return Ok(profile);
        }
        let profile = SocialProfile::new(user.clone());
        let bytes = serde_json::to_vec(&profile)?;
        match self.tree.compare_and_swap(user.0.as_bytes(), None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => {
                debug!(%user, "created social profile");
                Ok(profile)
            }
            Err(CompareAndSwapError { current: Some(existing), .. }) => Ok(serde_json::from_slice(&existing)?),
            Err(CompareAndSwapError { current: None, .. }) => {
                Err(anyhow!("profile for {user} vanished while being created").into())
            }
        }
    }

    /// Read-modify-write of one profile, retried until the swap lands.
    /// Unchanged documents are not written back.
    pub fn profile_mut(&self, user: &UserId, mut func: impl FnMut(&mut SocialProfile)) -> Result<SocialProfile> {
        self.get_or_create(user)?;
        let key = user.0.as_bytes();
        loop {
            let current = self.tree.get(key)?.with_context(|| format!("profile {user} vanished"))?;
            let mut profile: SocialProfile = serde_json::from_slice(&current)?;
            let before = profile.clone();
            func(&mut profile);
            if profile == before {
                return Ok(profile);
            }
            let next = serde_json::to_vec(&profile)?;
            match self.tree.compare_and_swap(key, Some(current), Some(next))? {
                Ok(()) => return Ok(profile),
                Err(_) => debug!(%user, "profile changed concurrently, retrying"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }
}
