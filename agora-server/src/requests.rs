//! Friend and follow request workflows.
//!
//! A pending request is a row in its tree plus an entry in a pair index whose
//! value is the request id. Follow requests are keyed by
//! `requester:recipient`; friend requests by the unordered pair, so a claim
//! in either direction contends for the same entry. The row is written
//! before the index is claimed, so a claimed index always points at a row
//! that existed. An index entry whose row is gone or no longer pending is
//! stale (left behind by an interrupted accept or reject) and is released on
//! the next lookup.

use agora_common::{
    FollowRequest, FollowRequestStatus, FollowRequestUuid, FriendRequest, FriendRequestStatus, FriendRequestUuid,
    NotificationKind, SocialProfile, UserId,
};
use chrono::Utc;
use sled::Tree;
use tracing::{debug, info};
use uuid::Uuid;

use crate::graph::{ensure_not_blocked, reject_self, SocialGraph};
use crate::store::{claim, friend_pair_key, get, pair_key, put, release, scan};
use crate::{AppError, Result};

impl SocialGraph {
    pub fn send_friend_request(&self, requester: &UserId, recipient: &UserId) -> Result<FriendRequest> {
        reject_self(requester, recipient, "send a friend request to")?;
        let requester_profile = self.profiles.get_or_create(requester)?;
        let recipient_profile = self.profiles.get_or_create(recipient)?;
        if requester_profile.is_friend(recipient) || recipient_profile.is_friend(requester) {
            return Err(AppError::Conflict(format!("already friends with {recipient}")));
        }
        ensure_not_blocked(&requester_profile, &recipient_profile)?;
        if self.pending_friend_request(requester, recipient)?.is_some() {
            return Err(AppError::Conflict(String::from("a friend request between you is already pending")));
        }

        let request = FriendRequest {
            uuid: FriendRequestUuid(Uuid::new_v4().to_string()),
            requester: requester.clone(),
            recipient: recipient.clone(),
            status: FriendRequestStatus::Pending,
            created_at: Utc::now(),
        };
        put(&self.friend_requests, request.uuid.0.as_bytes(), &request)?;
        if claim(&self.friend_request_pairs, friend_pair_key(requester, recipient), &request.uuid.0)?.is_some() {
            self.friend_requests.remove(request.uuid.0.as_bytes())?;
            return Err(AppError::Conflict(String::from("a friend request between you is already pending")));
        }
        info!(%requester, %recipient, request = %request.uuid, "friend request sent");
        self.notify(recipient, requester, NotificationKind::FriendRequest);
        Ok(request)
    }

    /// Not atomic: the two friend writes, the row delete and the index release
    /// are separate. Re-running accept after a partial failure is harmless
    /// while the row is still pending.
    pub fn accept_friend_request(&self, uuid: &FriendRequestUuid, acting: &UserId) -> Result<SocialProfile> {
        let request = self.pending_friend_row(uuid)?;
        if &request.recipient != acting {
            return Err(AppError::Forbidden(String::from("only the recipient can accept a friend request")));
        }
        let requester = &request.requester;
        ensure_not_blocked(&self.profiles.get_or_create(requester)?, &self.profiles.get_or_create(acting)?)?;

        self.profiles.profile_mut(requester, |p| { p.friends.insert(acting.clone()); })?;
        let profile = self.profiles.profile_mut(acting, |p| { p.friends.insert(requester.clone()); })?;
        self.friend_requests.remove(uuid.0.as_bytes())?;
        release(&self.friend_request_pairs, friend_pair_key(requester, acting), &uuid.0)?;
        info!(%requester, recipient = %acting, request = %uuid, "friend request accepted");
        self.notify(requester, acting, NotificationKind::FriendRequestAccepted);
        Ok(profile)
    }

    pub fn reject_friend_request(&self, uuid: &FriendRequestUuid, acting: &UserId) -> Result<FriendRequest> {
        let mut request = self.pending_friend_row(uuid)?;
        if &request.recipient != acting {
            return Err(AppError::Forbidden(String::from("only the recipient can reject a friend request")));
        }
        request.status = FriendRequestStatus::Rejected;
        put(&self.friend_requests, uuid.0.as_bytes(), &request)?;
        release(&self.friend_request_pairs, friend_pair_key(&request.requester, acting), &uuid.0)?;
        info!(requester = %request.requester, recipient = %acting, request = %uuid, "friend request rejected");
        Ok(request)
    }

    pub fn cancel_friend_request(&self, uuid: &FriendRequestUuid, acting: &UserId) -> Result<()> {
        let request = self.pending_friend_row(uuid)?;
        if &request.requester != acting {
            return Err(AppError::Forbidden(String::from("only the requester can cancel a friend request")));
        }
        self.friend_requests.remove(uuid.0.as_bytes())?;
        release(&self.friend_request_pairs, friend_pair_key(acting, &request.recipient), &uuid.0)?;
        info!(requester = %acting, recipient = %request.recipient, request = %uuid, "friend request cancelled");
        Ok(())
    }

    pub fn incoming_friend_requests(&self, user: &UserId) -> Result<Vec<FriendRequest>> {
        self.friend_requests_where(|r| &r.recipient == user)
    }

    pub fn outgoing_friend_requests(&self, user: &UserId) -> Result<Vec<FriendRequest>> {
        self.friend_requests_where(|r| &r.requester == user)
    }

    fn friend_requests_where(&self, filter: impl Fn(&FriendRequest) -> bool) -> Result<Vec<FriendRequest>> {
        let mut requests: Vec<FriendRequest> = scan::<FriendRequest>(&self.friend_requests)?
            .into_iter()
            .filter(|r: &FriendRequest| r.status == FriendRequestStatus::Pending && filter(r))
            .collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    fn pending_friend_row(&self, uuid: &FriendRequestUuid) -> Result<FriendRequest> {
        get::<FriendRequest>(&self.friend_requests, uuid.0.as_bytes())?
            .filter(|r| r.status == FriendRequestStatus::Pending)
            .ok_or_else(|| AppError::NotFound(format!("pending friend request {uuid}")))
    }

    /// Pending request between the pair, in either direction.
    fn pending_friend_request(&self, a: &UserId, b: &UserId) -> Result<Option<FriendRequest>> {
        let key = friend_pair_key(a, b);
        let Some(uuid) = indexed_id(&self.friend_request_pairs, &key)? else {
            return Ok(None);
        };
        match get::<FriendRequest>(&self.friend_requests, uuid.as_bytes())? {
            Some(request) if request.status == FriendRequestStatus::Pending => Ok(Some(request)),
            _ => {
                debug!(%key, "releasing stale friend request index");
                release(&self.friend_request_pairs, &key, &uuid)?;
                Ok(None)
            }
        }
    }

    /// Called by `follow` for private targets.
    pub(crate) fn request_follow(&self, requester: &UserId, recipient: &UserId) -> Result<FollowRequest> {
        if self.pending_follow_request(requester, recipient)?.is_some() {
            return Err(AppError::Conflict(format!("a follow request to {recipient} is already pending")));
        }
        let request = FollowRequest {
            uuid: FollowRequestUuid(Uuid::new_v4().to_string()),
            requester: requester.clone(),
            recipient: recipient.clone(),
            status: FollowRequestStatus::Pending,
            created_at: Utc::now(),
        };
        put(&self.follow_requests, request.uuid.0.as_bytes(), &request)?;
        if claim(&self.follow_request_pairs, pair_key(requester, recipient), &request.uuid.0)?.is_some() {
            self.follow_requests.remove(request.uuid.0.as_bytes())?;
            return Err(AppError::Conflict(format!("a follow request to {recipient} is already pending")));
        }
        info!(%requester, %recipient, request = %request.uuid, "follow request sent");
        self.notify(recipient, requester, NotificationKind::FollowRequest);
        Ok(request)
    }

    pub fn approve_follow_request(&self, uuid: &FollowRequestUuid, acting: &UserId) -> Result<FollowRequest> {
        let mut request = self.pending_follow_row(uuid)?;
        if &request.recipient != acting {
            return Err(AppError::Forbidden(String::from("only the recipient can approve a follow request")));
        }
        let requester = request.requester.clone();
        ensure_not_blocked(&self.profiles.get_or_create(&requester)?, &self.profiles.get_or_create(acting)?)?;

        self.add_follow_edge(&requester, acting)?;
        request.status = FollowRequestStatus::Approved;
        put(&self.follow_requests, uuid.0.as_bytes(), &request)?;
        release(&self.follow_request_pairs, pair_key(&requester, acting), &uuid.0)?;
        info!(%requester, recipient = %acting, request = %uuid, "follow request approved");
        self.notify(&requester, acting, NotificationKind::FollowRequestApproved);
        Ok(request)
    }

    pub fn deny_follow_request(&self, uuid: &FollowRequestUuid, acting: &UserId) -> Result<FollowRequest> {
        let mut request = self.pending_follow_row(uuid)?;
        if &request.recipient != acting {
            return Err(AppError::Forbidden(String::from("only the recipient can deny a follow request")));
        }
        request.status = FollowRequestStatus::Denied;
        put(&self.follow_requests, uuid.0.as_bytes(), &request)?;
        release(&self.follow_request_pairs, pair_key(&request.requester, acting), &uuid.0)?;
        info!(requester = %request.requester, recipient = %acting, request = %uuid, "follow request denied");
        Ok(request)
    }

    pub fn cancel_follow_request(&self, uuid: &FollowRequestUuid, acting: &UserId) -> Result<()> {
        let request = self.pending_follow_row(uuid)?;
        if &request.requester != acting {
            return Err(AppError::Forbidden(String::from("only the requester can cancel a follow request")));
        }
        self.follow_requests.remove(uuid.0.as_bytes())?;
        release(&self.follow_request_pairs, pair_key(acting, &request.recipient), &uuid.0)?;
        info!(requester = %acting, recipient = %request.recipient, request = %uuid, "follow request cancelled");
        Ok(())
    }

    pub fn incoming_follow_requests(&self, user: &UserId) -> Result<Vec<FollowRequest>> {
        self.follow_requests_where(|r| &r.recipient == user)
    }

    pub fn outgoing_follow_requests(&self, user: &UserId) -> Result<Vec<FollowRequest>> {
        self.follow_requests_where(|r| &r.requester == user)
    }

    fn follow_requests_where(&self, filter: impl Fn(&FollowRequest) -> bool) -> Result<Vec<FollowRequest>> {
        let mut requests: Vec<FollowRequest> = scan::<FollowRequest>(&self.follow_requests)?
            .into_iter()
            .filter(|r: &FollowRequest| r.status == FollowRequestStatus::Pending && filter(r))
            .collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    fn pending_follow_row(&self, uuid: &FollowRequestUuid) -> Result<FollowRequest> {
        get::<FollowRequest>(&self.follow_requests, uuid.0.as_bytes())?
            .filter(|r| r.status == FollowRequestStatus::Pending)
            .ok_or_else(|| AppError::NotFound(format!("pending follow request {uuid}")))
    }

    fn pending_follow_request(&self, requester: &UserId, recipient: &UserId) -> Result<Option<FollowRequest>> {
        let key = pair_key(requester, recipient);
        let Some(uuid) = indexed_id(&self.follow_request_pairs, &key)? else {
            return Ok(None);
        };
        match get::<FollowRequest>(&self.follow_requests, uuid.as_bytes())? {
            Some(request) if request.status == FollowRequestStatus::Pending => Ok(Some(request)),
            _ => {
                debug!(%key, "releasing stale follow request index");
                release(&self.follow_request_pairs, &key, &uuid)?;
                Ok(None)
            }
        }
    }
}

fn indexed_id(index: &Tree, key: &str) -> Result<Option<String>> {
    Ok(index.get(key)?.map(|id| String::from_utf8_lossy(&id).into_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use agora_common::{FollowOutcome, NotificationKind};

    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn accept_makes_mutual_friends_and_removes_the_request() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        assert_eq!(request.status, FriendRequestStatus::Pending);
        assert_eq!(fx.graph.incoming_friend_requests(&lyuma)?, vec![request.clone()]);
        assert_eq!(fx.graph.outgoing_friend_requests(&malek)?, vec![request.clone()]);
        assert_eq!(fx.notifications.inbox(&lyuma)?[0].kind, NotificationKind::FriendRequest);

        let profile = fx.graph.accept_friend_request(&request.uuid, &lyuma)?;
        assert!(profile.is_friend(&malek));
        assert!(fx.graph.profile(&malek)?.is_friend(&lyuma));
        assert!(fx.graph.friend_requests.get(request.uuid.0.as_bytes())?.is_none());
        assert!(fx.graph.incoming_friend_requests(&lyuma)?.is_empty());

        let inbox = fx.notifications.inbox(&malek)?;
        assert_eq!(inbox[0].kind, NotificationKind::FriendRequestAccepted);
        assert_eq!(inbox[0].actor, lyuma);
        Ok(())
    }

    #[test]
    fn duplicate_requests_conflict_in_either_direction() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        fx.graph.send_friend_request(&malek, &lyuma)?;
        assert!(matches!(fx.graph.send_friend_request(&malek, &lyuma), Err(AppError::Conflict(_))));
        assert!(matches!(fx.graph.send_friend_request(&lyuma, &malek), Err(AppError::Conflict(_))));
        assert_eq!(fx.graph.friend_requests.len(), 1);
        Ok(())
    }

    #[test]
    fn opposite_concurrent_requests_leave_one_pending() -> anyhow::Result<()> {
        for _ in 0..50 {
            let fx = Fixture::new();
            let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [(malek.clone(), lyuma.clone()), (lyuma.clone(), malek.clone())]
                .into_iter()
                .map(|(from, to)| {
                    let graph = fx.graph.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        graph.send_friend_request(&from, &to)
                    })
                })
                .collect();
            let sent = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|result| match result {
                    Ok(_) => true,
                    Err(AppError::Conflict(_)) => false,
                    Err(other) => panic!("unexpected {other:?}"),
                })
                .count();
            assert_eq!(sent, 1);
            let pending = fx.graph.incoming_friend_requests(&malek)?.len() + fx.graph.incoming_friend_requests(&lyuma)?.len();
            assert_eq!(pending, 1);
        }
        Ok(())
    }

    #[test]
    fn one_sided_friendship_still_conflicts() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        // Accept interrupted after only the requester's side was written.
        fx.graph.profiles().profile_mut(&malek, |p| { p.friends.insert(lyuma.clone()); })?;
        assert!(matches!(fx.graph.send_friend_request(&lyuma, &malek), Err(AppError::Conflict(_))));
        assert!(matches!(fx.graph.send_friend_request(&malek, &lyuma), Err(AppError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn already_friends_conflict() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        fx.befriend(&malek, &lyuma)?;
        assert!(matches!(fx.graph.send_friend_request(&lyuma, &malek), Err(AppError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn only_the_recipient_may_accept() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma, ada) = (fx.user("malek"), fx.user("lyuma"), fx.user("ada"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        for intruder in [&malek, &ada] {
            assert!(matches!(
                fx.graph.accept_friend_request(&request.uuid, intruder),
                Err(AppError::Forbidden(_))
            ));
        }
        assert_eq!(fx.graph.pending_friend_row(&request.uuid)?, request);
        assert!(fx.graph.friends(&malek)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_or_settled_requests_are_not_found() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let missing = FriendRequestUuid(String::from("missing"));
        assert!(matches!(fx.graph.accept_friend_request(&missing, &lyuma), Err(AppError::NotFound(_))));

        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        fx.graph.reject_friend_request(&request.uuid, &lyuma)?;
        assert!(matches!(fx.graph.accept_friend_request(&request.uuid, &lyuma), Err(AppError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn reject_keeps_the_row_and_frees_the_pair() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        assert!(matches!(fx.graph.reject_friend_request(&request.uuid, &malek), Err(AppError::Forbidden(_))));
        let rejected = fx.graph.reject_friend_request(&request.uuid, &lyuma)?;
        assert_eq!(rejected.status, FriendRequestStatus::Rejected);
        let stored: FriendRequest = get(&fx.graph.friend_requests, request.uuid.0.as_bytes())?.unwrap();
        assert_eq!(stored.status, FriendRequestStatus::Rejected);
        assert!(fx.graph.incoming_friend_requests(&lyuma)?.is_empty());
        fx.graph.send_friend_request(&malek, &lyuma)?;
        Ok(())
    }

    #[test]
    fn cancel_is_for_the_requester_only() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        assert!(matches!(fx.graph.cancel_friend_request(&request.uuid, &lyuma), Err(AppError::Forbidden(_))));
        fx.graph.cancel_friend_request(&request.uuid, &malek)?;
        assert!(fx.graph.friend_requests.is_empty());
        assert!(fx.graph.friend_request_pairs.is_empty());
        fx.graph.send_friend_request(&lyuma, &malek)?;
        Ok(())
    }

    #[test]
    fn stale_pair_index_is_released() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        // Accept interrupted right after the row delete.
        fx.graph.friend_requests.remove(request.uuid.0.as_bytes())?;
        let again = fx.graph.send_friend_request(&malek, &lyuma)?;
        assert_ne!(again.uuid, request.uuid);
        Ok(())
    }

    #[test]
    fn pending_request_survives_a_block_but_cannot_be_accepted() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.user("lyuma"));
        let request = fx.graph.send_friend_request(&malek, &lyuma)?;
        fx.graph.block(&lyuma, &malek)?;
        assert_eq!(fx.graph.incoming_friend_requests(&lyuma)?.len(), 1);
        assert!(matches!(fx.graph.accept_friend_request(&request.uuid, &lyuma), Err(AppError::Forbidden(_))));
        assert!(matches!(fx.graph.send_friend_request(&lyuma, &malek), Err(AppError::Forbidden(_))));
        fx.graph.reject_friend_request(&request.uuid, &lyuma)?;
        Ok(())
    }

    fn requested(outcome: FollowOutcome) -> FollowRequest {
        match outcome {
            FollowOutcome::Requested(request) => request,
            other => panic!("expected a follow request, got {other:?}"),
        }
    }

    #[test]
    fn private_targets_require_approval() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.private_user("lyuma"));
        let request = requested(fx.graph.follow(&malek, &lyuma)?);
        assert_eq!(request.status, FollowRequestStatus::Pending);
        assert!(fx.graph.following(&malek)?.is_empty());
        assert!(matches!(fx.graph.follow(&malek, &lyuma), Err(AppError::Conflict(_))));
        assert_eq!(fx.graph.incoming_follow_requests(&lyuma)?, vec![request.clone()]);
        assert_eq!(fx.notifications.inbox(&lyuma)?[0].kind, NotificationKind::FollowRequest);

        assert!(matches!(fx.graph.approve_follow_request(&request.uuid, &malek), Err(AppError::Forbidden(_))));
        let approved = fx.graph.approve_follow_request(&request.uuid, &lyuma)?;
        assert_eq!(approved.status, FollowRequestStatus::Approved);
        assert!(fx.graph.profile(&malek)?.is_following(&lyuma));
        assert!(fx.graph.profile(&lyuma)?.followers.contains(&malek));
        assert!(fx.graph.incoming_follow_requests(&lyuma)?.is_empty());
        assert_eq!(fx.notifications.inbox(&malek)?[0].kind, NotificationKind::FollowRequestApproved);

        // Already following: no new request.
        assert!(matches!(fx.graph.follow(&malek, &lyuma)?, FollowOutcome::Followed(_)));
        Ok(())
    }

    #[test]
    fn deny_and_cancel_follow_requests() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.user("malek"), fx.private_user("lyuma"));
        let request = requested(fx.graph.follow(&malek, &lyuma)?);
        let denied = fx.graph.deny_follow_request(&request.uuid, &lyuma)?;
        assert_eq!(denied.status, FollowRequestStatus::Denied);
        assert!(fx.graph.following(&malek)?.is_empty());

        let request = requested(fx.graph.follow(&malek, &lyuma)?);
        assert_eq!(fx.graph.outgoing_follow_requests(&malek)?, vec![request.clone()]);
        assert!(matches!(fx.graph.cancel_follow_request(&request.uuid, &lyuma), Err(AppError::Forbidden(_))));
        fx.graph.cancel_follow_request(&request.uuid, &malek)?;
        assert!(fx.graph.outgoing_follow_requests(&malek)?.is_empty());
        assert!(matches!(fx.graph.deny_follow_request(&request.uuid, &lyuma), Err(AppError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn follow_requests_are_directed() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let (malek, lyuma) = (fx.private_user("malek"), fx.private_user("lyuma"));
        requested(fx.graph.follow(&malek, &lyuma)?);
        requested(fx.graph.follow(&lyuma, &malek)?);
        Ok(())
    }
}
