//! Relationship mutations over pairs of social profiles.
//!
//! Each edge change touches two profile documents with two independent
//! writes; there is no multi-document transaction. A failure between the
//! writes leaves one half recorded. Every mutation here is idempotent, so
//! repeating the call fills in the missing half. Until then readers may see
//! the edge from one side only.

use std::collections::BTreeSet;
use std::sync::Arc;

use agora_common::{Account, FollowOutcome, NotificationKind, SocialProfile, SocialStats, UserId};
use sled::{Db, Tree};
use tracing::{debug, info, warn};

use crate::notify::Notifier;
use crate::store::Profiles;
use crate::users::Directory;
use crate::{AppError, Result};

#[derive(Clone)]
pub struct SocialGraph {
    pub(crate) profiles: Profiles,
    pub(crate) friend_requests: Tree,
    pub(crate) friend_request_pairs: Tree,
    pub(crate) follow_requests: Tree,
    pub(crate) follow_request_pairs: Tree,
    pub(crate) directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl SocialGraph {
    pub fn new(db: &Db, directory: Arc<dyn Directory>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self {
            profiles: Profiles::new(db, directory.clone())?,
            friend_requests: db.open_tree("friend_requests")?,
            friend_request_pairs: db.open_tree("friend_request_pairs")?,
            follow_requests: db.open_tree("follow_requests")?,
            follow_request_pairs: db.open_tree("follow_request_pairs")?,
            directory,
            notifier,
        })
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn profile(&self, user: &UserId) -> Result<SocialProfile> {
        self.profiles.get_or_create(user)
    }

    pub(crate) fn notify(&self, recipient: &UserId, actor: &UserId, kind: NotificationKind) {
        if let Err(err) = self.notifier.notify(recipient, actor, kind) {
            warn!(%recipient, %actor, ?kind, error = %err, "notification dropped");
        }
    }

    /// Public targets are followed immediately. Private targets get a pending
    /// follow request unless the edge already exists.
    pub fn follow(&self, actor: &UserId, target: &UserId) -> Result<FollowOutcome> {
        reject_self(actor, target, "follow")?;
        let actor_profile = self.profiles.get_or_create(actor)?;
        let target_profile = self.profiles.get_or_create(target)?;
        ensure_not_blocked(&actor_profile, &target_profile)?;

        if !actor_profile.is_following(target) && self.directory.is_private(target)? {
            return Ok(FollowOutcome::Requested(self.request_follow(actor, target)?));
        }
        let (profile, added) = self.add_follow_edge(actor, target)?;
        if added {
            info!(%actor, %target, "followed");
            self.notify(target, actor, NotificationKind::NewFollower);
        } else {
            debug!(%actor, %target, "already following");
        }
        Ok(FollowOutcome::Followed(profile))
    }

    /// Returns the follower's profile and whether its `following` set changed.
    pub(crate) fn add_follow_edge(&self, follower: &UserId, followee: &UserId) -> Result<(SocialProfile, bool)> {
        let mut added = false;
        let profile = self.profiles.profile_mut(follower, |p| added = p.following.insert(followee.clone()))?;
        self.profiles.profile_mut(followee, |p| { p.followers.insert(follower.clone()); })?;
        Ok((profile, added))
    }

    pub fn unfollow(&self, actor: &UserId, target: &UserId) -> Result<SocialProfile> {
        reject_self(actor, target, "unfollow")?;
        self.profiles.get_or_create(target)?;
        let profile = self.profiles.profile_mut(actor, |p| { p.following.remove(target); })?;
        self.profiles.profile_mut(target, |p| { p.followers.remove(actor); })?;
        info!(%actor, %target, "unfollowed");
        Ok(profile)
    }

    pub fn remove_follower(&self, actor: &UserId, follower: &UserId) -> Result<SocialProfile> {
        reject_self(actor, follower, "remove")?;
        self.profiles.get_or_create(follower)?;
        let profile = self.profiles.profile_mut(actor, |p| { p.followers.remove(follower); })?;
        self.profiles.profile_mut(follower, |p| { p.following.remove(actor); })?;
        info!(%actor, %follower, "removed follower");
        Ok(profile)
    }

    /// Blocking an already blocked user re-runs the cascade, which finishes a
    /// block that was interrupted after `blocked_users` was written.
    pub fn block(&self, actor: &UserId, target: &UserId) -> Result<SocialProfile> {
        reject_self(actor, target, "block")?;
        self.profiles.get_or_create(target)?;
        let mut added = false;
        self.profiles.profile_mut(actor, |p| added = p.blocked_users.insert(target.clone()))?;
        self.enforce_block(actor, target)?;
        if added {
            info!(%actor, %target, "blocked");
        } else {
            debug!(%actor, %target, "already blocked");
        }
        self.profiles.get_or_create(actor)
    }

    /// Pending friend or follow requests between the pair are left alone; they
    /// can no longer be accepted while the block stands.
    pub fn enforce_block(&self, blocker: &UserId, blocked: &UserId) -> Result<()> {
        self.profiles.profile_mut(blocker, |p| strip(p, blocked))?;
        self.profiles.profile_mut(blocked, |p| strip(p, blocker))?;
        Ok(())
    }

    /// Relationships removed by the block are not restored.
    pub fn unblock(&self, actor: &UserId, target: &UserId) -> Result<SocialProfile> {
        reject_self(actor, target, "unblock")?;
        let profile = self.profiles.profile_mut(actor, |p| { p.blocked_users.remove(target); })?;
        info!(%actor, %target, "unblocked");
        Ok(profile)
    }

    pub fn unfriend(&self, actor: &UserId, friend: &UserId) -> Result<SocialProfile> {
        reject_self(actor, friend, "unfriend")?;
        if !self.profiles.get_or_create(actor)?.is_friend(friend) {
            return Err(AppError::NotFound(format!("{friend} is not a friend")));
        }
        let profile = self.profiles.profile_mut(actor, |p| { p.friends.remove(friend); })?;
        self.profiles.profile_mut(friend, |p| { p.friends.remove(actor); })?;
        info!(%actor, %friend, "unfriended");
        Ok(profile)
    }

    pub fn friends(&self, user: &UserId) -> Result<Vec<Account>> {
        self.accounts(&self.profiles.get_or_create(user)?.friends)
    }

    pub fn followers(&self, user: &UserId) -> Result<Vec<Account>> {
        self.accounts(&self.profiles.get_or_create(user)?.followers)
    }

    pub fn following(&self, user: &UserId) -> Result<Vec<Account>> {
        self.accounts(&self.profiles.get_or_create(user)?.following)
    }

    pub fn blocked(&self, user: &UserId) -> Result<Vec<Account>> {
        self.accounts(&self.profiles.get_or_create(user)?.blocked_users)
    }

    pub fn stats(&self, user: &UserId) -> Result<SocialStats> {
        let profile = self.profiles.get_or_create(user)?;
        Ok(SocialStats {
            friends: profile.friends.len(),
            followers: profile.followers.len(),
            following: profile.following.len(),
            blocked: profile.blocked_users.len(),
            pending_friend_requests: self.incoming_friend_requests(user)?.len(),
            pending_follow_requests: self.incoming_follow_requests(user)?.len(),
        })
    }

    // Ids whose account is gone are skipped.
    fn accounts(&self, ids: &BTreeSet<UserId>) -> Result<Vec<Account>> {
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.directory.account(id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }
}

fn strip(profile: &mut SocialProfile, peer: &UserId) {
    profile.friends.remove(peer);
    profile.following.remove(peer);
    profile.followers.remove(peer);
}

pub(crate) fn reject_self(actor: &UserId, target: &UserId, action: &str) -> Result<()> {
    if actor == target {
        return Err(AppError::BadRequest(format!("you cannot {action} yourself")));
    }
    Ok(())
}

pub(crate) fn ensure_not_blocked(a: &SocialProfile, b: &SocialProfile) -> Result<()> {
    if a.has_blocked(&b.owner) || b.has_blocked(&a.owner) {
        return Err(AppError::Forbidden(String::from("a block exists between these users")));
    }
    Ok(())
}
