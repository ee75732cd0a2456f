pub mod non_api_structs;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Url(pub String);

impl Url {
    pub fn join(&self, path: impl AsRef<str>) -> String {
        self.0.trim_end_matches('/').to_string() + path.as_ref()
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub String);
impl AsRef<UserId> for UserId {
    fn as_ref(&self) -> &UserId {
        self
    }
}
impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FriendRequestUuid(pub String);
impl fmt::Display for FriendRequestUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FollowRequestUuid(pub String);
impl fmt::Display for FollowRequestUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NotificationUuid(pub String);

/// Relationship sets of one user. Only the server's social graph writes these.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialProfile {
    pub owner: UserId,
    pub friends: BTreeSet<UserId>,
    pub followers: BTreeSet<UserId>,
    pub following: BTreeSet<UserId>,
    pub blocked_users: BTreeSet<UserId>,
}

impl SocialProfile {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }
    pub fn is_friend(&self, user: &UserId) -> bool {
        self.friends.contains(user)
    }
    pub fn is_following(&self, user: &UserId) -> bool {
        self.following.contains(user)
    }
    pub fn has_blocked(&self, user: &UserId) -> bool {
        self.blocked_users.contains(user)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FriendRequestStatus {
    #[default]
    Pending,
    Rejected,
}

/// Accepted and cancelled requests are deleted, so only these two states are ever stored.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub uuid: FriendRequestUuid,
    pub requester: UserId,
    pub recipient: UserId,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FollowRequestStatus {
    #[default]
    Pending,
    Approved,
    Denied,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub uuid: FollowRequestUuid,
    pub requester: UserId,
    pub recipient: UserId,
    pub status: FollowRequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of a follow: public targets are followed at once, private ones get a request.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "outcome", content = "data", rename_all = "camelCase")]
pub enum FollowOutcome {
    Followed(SocialProfile),
    Requested(FollowRequest),
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub private: bool,
    pub interests: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub username: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub interests: BTreeSet<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub account: Account,
    pub token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PrivacyUpdate {
    pub private: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct InterestsUpdate {
    pub interests: BTreeSet<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendFriendRequest {
    pub recipient_id: UserId,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    FriendRequest,
    FriendRequestAccepted,
    FollowRequest,
    FollowRequestApproved,
    NewFollower,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub uuid: NotificationUuid,
    pub recipient: UserId,
    pub actor: UserId,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub user: UserId,
    pub username: String,
    pub shared_interests: usize,
    pub follower_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialStats {
    pub friends: usize,
    pub followers: usize,
    pub following: usize,
    pub blocked: usize,
    pub pending_friend_requests: usize,
    pub pending_follow_requests: usize,
}
