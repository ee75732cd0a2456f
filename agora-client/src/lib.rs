use agora_common::{Url, UserId};
use serde::Deserialize;
use thiserror::Error;

/// Non-2xx response from the server. Callers can `downcast_ref` it out of the
/// returned `anyhow::Error` to branch on the status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// A registered user's bearer credentials on one server.
#[derive(Clone, Debug)]
pub struct Login {
    pub server: Url,
    pub user: UserId,
    pub token: String,
}

pub mod client {
    use agora_common::{
        Account, FollowOutcome, FollowRequest, FollowRequestUuid, FriendRequest, FriendRequestUuid, InterestsUpdate,
        NewAccount, Notification, NotificationUuid, PrivacyUpdate, Recommendation, Registration, SendFriendRequest,
        SocialProfile, SocialStats, Url, UserId,
    };
    use anyhow::Result;
    use reqwest::{Client, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use std::collections::BTreeSet;

    use crate::{ApiError, ErrorBody, Login};

    async fn checked(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text).map(|body| body.error).unwrap_or(text);
        Err(ApiError { status: status.as_u16(), message }.into())
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        Ok(checked(request).await?.json::<T>().await?)
    }

    fn get(client: &Client, login: &Login, path: impl AsRef<str>) -> RequestBuilder {
        client.get(login.server.join(path)).bearer_auth(&login.token)
    }
    fn post(client: &Client, login: &Login, path: impl AsRef<str>) -> RequestBuilder {
        client.post(login.server.join(path)).bearer_auth(&login.token)
    }
    fn patch(client: &Client, login: &Login, path: impl AsRef<str>) -> RequestBuilder {
        client.patch(login.server.join(path)).bearer_auth(&login.token)
    }
    fn put(client: &Client, login: &Login, path: impl AsRef<str>) -> RequestBuilder {
        client.put(login.server.join(path)).bearer_auth(&login.token)
    }
    fn delete(client: &Client, login: &Login, path: impl AsRef<str>) -> RequestBuilder {
        client.delete(login.server.join(path)).bearer_auth(&login.token)
    }

    pub async fn register(client: &Client, server: &Url, account: NewAccount) -> Result<Login> {
        let registration: Registration = json(client.post(server.join("/users")).json(&account)).await?;
        Ok(Login {
            server: server.clone(),
            user: registration.account.id,
            token: registration.token,
        })
    }
    pub async fn me(client: &Client, login: &Login) -> Result<Account> {
        json(get(client, login, "/users/me")).await
    }
    pub async fn set_privacy(client: &Client, login: &Login, private: bool) -> Result<Account> {
        json(patch(client, login, "/users/me/privacy").json(&PrivacyUpdate { private })).await
    }
    pub async fn set_interests(client: &Client, login: &Login, interests: BTreeSet<String>) -> Result<Account> {
        json(put(client, login, "/users/me/interests").json(&InterestsUpdate { interests })).await
    }

    pub async fn get_profile(client: &Client, login: &Login) -> Result<SocialProfile> {
        json(get(client, login, "/social/profile")).await
    }
    pub async fn follow(client: &Client, login: &Login, target: &UserId) -> Result<FollowOutcome> {
        json(post(client, login, format!("/social/follow/{target}"))).await
    }
    pub async fn unfollow(client: &Client, login: &Login, target: &UserId) -> Result<SocialProfile> {
        json(delete(client, login, format!("/social/unfollow/{target}"))).await
    }
    pub async fn remove_follower(client: &Client, login: &Login, follower: &UserId) -> Result<SocialProfile> {
        json(delete(client, login, format!("/social/followers/{follower}"))).await
    }
    pub async fn block(client: &Client, login: &Login, target: &UserId) -> Result<SocialProfile> {
        json(post(client, login, format!("/social/block/{target}"))).await
    }
    pub async fn unblock(client: &Client, login: &Login, target: &UserId) -> Result<SocialProfile> {
        json(delete(client, login, format!("/social/unblock/{target}"))).await
    }
    pub async fn get_followers(client: &Client, login: &Login) -> Result<Vec<Account>> {
        json(get(client, login, "/social/followers")).await
    }
    pub async fn get_following(client: &Client, login: &Login) -> Result<Vec<Account>> {
        json(get(client, login, "/social/following")).await
    }
    pub async fn get_blocked(client: &Client, login: &Login) -> Result<Vec<Account>> {
        json(get(client, login, "/social/blocked")).await
    }
    pub async fn get_recommendations(client: &Client, login: &Login, limit: Option<usize>) -> Result<Vec<Recommendation>> {
        let mut request = get(client, login, "/social/recommendations");
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        json(request).await
    }
    pub async fn get_stats(client: &Client, login: &Login) -> Result<SocialStats> {
        json(get(client, login, "/social/stats")).await
    }

    pub async fn get_friends(client: &Client, login: &Login) -> Result<Vec<Account>> {
        json(get(client, login, "/social/friends/list")).await
    }
    pub async fn send_friend_request(client: &Client, login: &Login, recipient: &UserId) -> Result<FriendRequest> {
        let payload = SendFriendRequest { recipient_id: recipient.clone() };
        json(post(client, login, "/social/friends/request").json(&payload)).await
    }
    pub async fn rec_friend_requests(client: &Client, login: &Login) -> Result<Vec<FriendRequest>> {
        json(get(client, login, "/social/friends/requests/pending")).await
    }
    pub async fn sent_friend_requests(client: &Client, login: &Login) -> Result<Vec<FriendRequest>> {
        json(get(client, login, "/social/friends/requests/sent")).await
    }
    pub async fn accept_friend_request(client: &Client, login: &Login, fuuid: &FriendRequestUuid) -> Result<SocialProfile> {
        json(patch(client, login, format!("/social/friends/requests/{fuuid}/accept"))).await
    }
    pub async fn reject_friend_request(client: &Client, login: &Login, fuuid: &FriendRequestUuid) -> Result<FriendRequest> {
        json(patch(client, login, format!("/social/friends/requests/{fuuid}/reject"))).await
    }
    pub async fn cancel_friend_request(client: &Client, login: &Login, fuuid: &FriendRequestUuid) -> Result<()> {
        checked(delete(client, login, format!("/social/friends/requests/{fuuid}"))).await?;
        Ok(())
    }
    pub async fn unfriend(client: &Client, login: &Login, friend: &UserId) -> Result<SocialProfile> {
        json(delete(client, login, format!("/social/friends/{friend}"))).await
    }

    pub async fn rec_follow_requests(client: &Client, login: &Login) -> Result<Vec<FollowRequest>> {
        json(get(client, login, "/social/follow-requests/pending")).await
    }
    pub async fn sent_follow_requests(client: &Client, login: &Login) -> Result<Vec<FollowRequest>> {
        json(get(client, login, "/social/follow-requests/sent")).await
    }
    pub async fn approve_follow_request(client: &Client, login: &Login, fuuid: &FollowRequestUuid) -> Result<FollowRequest> {
        json(patch(client, login, format!("/social/follow-requests/{fuuid}/approve"))).await
    }
    pub async fn deny_follow_request(client: &Client, login: &Login, fuuid: &FollowRequestUuid) -> Result<FollowRequest> {
        json(patch(client, login, format!("/social/follow-requests/{fuuid}/deny"))).await
    }
    pub async fn cancel_follow_request(client: &Client, login: &Login, fuuid: &FollowRequestUuid) -> Result<()> {
        checked(delete(client, login, format!("/social/follow-requests/{fuuid}"))).await?;
        Ok(())
    }

    pub async fn get_notifications(client: &Client, login: &Login) -> Result<Vec<Notification>> {
        json(get(client, login, "/notifications")).await
    }
    pub async fn mark_notification_read(client: &Client, login: &Login, nuuid: &NotificationUuid) -> Result<Notification> {
        json(patch(client, login, format!("/notifications/{}/read", nuuid.0))).await
    }
}

/// Status code of a failed call, if the server answered at all.
pub fn status_of(error: &anyhow::Error) -> Option<u16> {
    error.downcast_ref::<ApiError>().map(|e| e.status)
}
