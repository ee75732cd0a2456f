use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use uuid::Uuid;

use crate::{AppError, Result};

pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/users", post(accounts::register))
        .route("/users/me", get(accounts::me))
        .route("/users/me/privacy", patch(accounts::set_privacy))
        .route("/users/me/interests", put(accounts::set_interests))
        .route("/social/profile", get(social::profile))
        .route("/social/follow/:user_id", post(social::follow))
        .route("/social/unfollow/:user_id", delete(social::unfollow))
        .route("/social/followers", get(social::followers))
        .route("/social/followers/:user_id", delete(social::remove_follower))
        .route("/social/following", get(social::following))
        .route("/social/block/:user_id", post(social::block))
        .route("/social/unblock/:user_id", delete(social::unblock))
        .route("/social/blocked", get(social::blocked))
        .route("/social/recommendations", get(social::recommendations))
        .route("/social/stats", get(social::stats))
        .route("/social/friends/list", get(friends::list))
        .route("/social/friends/request", post(friends::send_request))
        .route("/social/friends/requests/pending", get(friends::pending))
        .route("/social/friends/requests/sent", get(friends::sent))
        .route("/social/friends/requests/:request_id", delete(friends::cancel))
        .route("/social/friends/requests/:request_id/accept", patch(friends::accept))
        .route("/social/friends/requests/:request_id/reject", patch(friends::reject))
        .route("/social/friends/:user_id", delete(friends::unfriend))
        .route("/social/follow-requests/pending", get(follow_requests::pending))
        .route("/social/follow-requests/sent", get(follow_requests::sent))
        .route("/social/follow-requests/:request_id", delete(follow_requests::cancel))
        .route("/social/follow-requests/:request_id/approve", patch(follow_requests::approve))
        .route("/social/follow-requests/:request_id/deny", patch(follow_requests::deny))
        .route("/notifications", get(notifications::inbox))
        .route("/notifications/:notification_id/read", patch(notifications::mark_read))
}

async fn root() -> &'static str {
    "agora social"
}

/// Path ids are UUIDs; anything else is rejected before reaching the graph.
fn parse_id(raw: &str) -> Result<String> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| AppError::Validation(format!("malformed id {raw:?}")))
}

mod accounts {
    use agora_common::{Account, InterestsUpdate, NewAccount, PrivacyUpdate, Registration};
    use axum::http::StatusCode;
    use axum::{Extension, Json};

    use crate::auth::AuthUser;
    use crate::users::Directory;
    use crate::{AppError, Result, State};

    pub async fn register(Extension(state): Extension<State>, Json(payload): Json<NewAccount>) -> Result<(StatusCode, Json<Registration>)> {
        Ok((StatusCode::CREATED, Json(state.users.register(payload)?)))
    }

    pub async fn me(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Account>> {
        let account = state.users.account(&user)?.ok_or_else(|| AppError::NotFound(format!("user {user}")))?;
        Ok(Json(account))
    }

    pub async fn set_privacy(Extension(state): Extension<State>, AuthUser(user): AuthUser, Json(payload): Json<PrivacyUpdate>) -> Result<Json<Account>> {
        Ok(Json(state.users.set_privacy(&user, payload.private)?))
    }

    pub async fn set_interests(Extension(state): Extension<State>, AuthUser(user): AuthUser, Json(payload): Json<InterestsUpdate>) -> Result<Json<Account>> {
        Ok(Json(state.users.set_interests(&user, payload.interests)?))
    }
}

mod social {
    use agora_common::{Account, FollowOutcome, Recommendation, SocialProfile, SocialStats, UserId};
    use axum::extract::{Path, Query};
    use axum::{Extension, Json};
    use serde::Deserialize;

    use super::parse_id;
    use crate::auth::AuthUser;
    use crate::{Result, State};

    fn target(raw: &str) -> Result<UserId> {
        Ok(UserId(parse_id(raw)?))
    }

    pub async fn profile(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.profile(&user)?))
    }

    pub async fn follow(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<FollowOutcome>> {
        Ok(Json(state.graph.follow(&user, &target(&user_id)?)?))
    }

    pub async fn unfollow(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.unfollow(&user, &target(&user_id)?)?))
    }

    pub async fn remove_follower(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.remove_follower(&user, &target(&user_id)?)?))
    }

    pub async fn block(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.block(&user, &target(&user_id)?)?))
    }

    pub async fn unblock(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.unblock(&user, &target(&user_id)?)?))
    }

    pub async fn followers(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<Account>>> {
        Ok(Json(state.graph.followers(&user)?))
    }

    pub async fn following(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<Account>>> {
        Ok(Json(state.graph.following(&user)?))
    }

    pub async fn blocked(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<Account>>> {
        Ok(Json(state.graph.blocked(&user)?))
    }

    #[derive(Deserialize)]
    pub struct RecommendationQuery {
        limit: Option<usize>,
    }

    pub async fn recommendations(Extension(state): Extension<State>, AuthUser(user): AuthUser, Query(query): Query<RecommendationQuery>) -> Result<Json<Vec<Recommendation>>> {
        let limit = query.limit.unwrap_or(state.config.recommendation_limit).min(100);
        let key = (user.clone(), limit);
        Ok(Json(state.recommendations.get_or_try_insert_with(key, || state.graph.recommendations(&user, limit))?))
    }

    pub async fn stats(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<SocialStats>> {
        Ok(Json(state.stats.get_or_try_insert_with(user.clone(), || state.graph.stats(&user))?))
    }
}

mod friends {
    use agora_common::{Account, FriendRequest, FriendRequestUuid, SendFriendRequest, SocialProfile, UserId};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};

    use super::parse_id;
    use crate::auth::AuthUser;
    use crate::{Result, State};

    fn request_id(raw: &str) -> Result<FriendRequestUuid> {
        Ok(FriendRequestUuid(parse_id(raw)?))
    }

    pub async fn send_request(Extension(state): Extension<State>, AuthUser(user): AuthUser, Json(payload): Json<SendFriendRequest>) -> Result<(StatusCode, Json<FriendRequest>)> {
        let recipient = UserId(parse_id(&payload.recipient_id.0)?);
        Ok((StatusCode::CREATED, Json(state.graph.send_friend_request(&user, &recipient)?)))
    }

    pub async fn accept(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.accept_friend_request(&request_id(&id)?, &user)?))
    }

    pub async fn reject(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<Json<FriendRequest>> {
        Ok(Json(state.graph.reject_friend_request(&request_id(&id)?, &user)?))
    }

    pub async fn cancel(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<StatusCode> {
        state.graph.cancel_friend_request(&request_id(&id)?, &user)?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn pending(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<FriendRequest>>> {
        Ok(Json(state.graph.incoming_friend_requests(&user)?))
    }

    pub async fn sent(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<FriendRequest>>> {
        Ok(Json(state.graph.outgoing_friend_requests(&user)?))
    }

    pub async fn unfriend(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(user_id): Path<String>) -> Result<Json<SocialProfile>> {
        Ok(Json(state.graph.unfriend(&user, &UserId(parse_id(&user_id)?))?))
    }

    pub async fn list(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<Account>>> {
        Ok(Json(state.graph.friends(&user)?))
    }
}

mod follow_requests {
    use agora_common::{FollowRequest, FollowRequestUuid};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};

    use super::parse_id;
    use crate::auth::AuthUser;
    use crate::{Result, State};

    fn request_id(raw: &str) -> Result<FollowRequestUuid> {
        Ok(FollowRequestUuid(parse_id(raw)?))
    }

    pub async fn approve(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<Json<FollowRequest>> {
        Ok(Json(state.graph.approve_follow_request(&request_id(&id)?, &user)?))
    }

    pub async fn deny(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<Json<FollowRequest>> {
        Ok(Json(state.graph.deny_follow_request(&request_id(&id)?, &user)?))
    }

    pub async fn cancel(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<StatusCode> {
        state.graph.cancel_follow_request(&request_id(&id)?, &user)?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn pending(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<FollowRequest>>> {
        Ok(Json(state.graph.incoming_follow_requests(&user)?))
    }

    pub async fn sent(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<FollowRequest>>> {
        Ok(Json(state.graph.outgoing_follow_requests(&user)?))
    }
}

mod notifications {
    use agora_common::{Notification, NotificationUuid};
    use axum::extract::Path;
    use axum::{Extension, Json};

    use super::parse_id;
    use crate::auth::AuthUser;
    use crate::{Result, State};

    pub async fn inbox(Extension(state): Extension<State>, AuthUser(user): AuthUser) -> Result<Json<Vec<Notification>>> {
        Ok(Json(state.notifications.inbox(&user)?))
    }

    pub async fn mark_read(Extension(state): Extension<State>, AuthUser(user): AuthUser, Path(id): Path<String>) -> Result<Json<Notification>> {
        Ok(Json(state.notifications.mark_read(&user, &NotificationUuid(parse_id(&id)?))?))
    }
}
