use std::cmp::Reverse;
use std::collections::BTreeSet;

use agora_common::{Recommendation, UserId};

use crate::graph::SocialGraph;
use crate::{AppError, Result};

impl SocialGraph {
    /// Read-only. Everyone the user already relates to is excluded, as is the
    /// user itself.
    pub fn recommendations(&self, user: &UserId, limit: usize) -> Result<Vec<Recommendation>> {
        let me = self
            .directory
            .account(user)?
            .ok_or_else(|| AppError::NotFound(format!("user {user}")))?;
        let profile = self.profiles.get_or_create(user)?;
        let mut exclude: BTreeSet<&UserId> = profile
            .friends
            .iter()
            .chain(&profile.followers)
            .chain(&profile.following)
            .chain(&profile.blocked_users)
            .collect();
        exclude.insert(user);

        let mut scored = Vec::new();
        for candidate in self.directory.accounts()? {
            if exclude.contains(&candidate.id) {
                continue;
            }
            let shared = me.interests.intersection(&candidate.interests).count();
            if shared == 0 {
                continue;
            }
            let follower_count = self.profiles.peek(&candidate.id)?.map_or(0, |p| p.followers.len());
            scored.push(Recommendation {
                user: candidate.id,
                username: candidate.username,
                shared_interests: shared,
                follower_count,
            });
        }
        Ok(rank(scored, limit))
    }
}

/// Most shared interests first, then most followers, then id for a stable order.
pub fn rank(mut scored: Vec<Recommendation>, limit: usize) -> Vec<Recommendation> {
    scored.sort_by_key(|r| (Reverse(r.shared_interests), Reverse(r.follower_count), r.user.clone()));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn scored(user: &str, shared_interests: usize, follower_count: usize) -> Recommendation {
        Recommendation {
            user: UserId(user.to_string()),
            username: user.to_string(),
            shared_interests,
            follower_count,
        }
    }

    #[test]
    fn rank_orders_by_interests_then_followers() {
        let ranked = rank(
            vec![scored("a", 1, 9), scored("b", 3, 0), scored("c", 1, 10), scored("d", 3, 2)],
            3,
        );
        let order: Vec<&str> = ranked.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "c"]);
    }

    #[test]
    fn excludes_existing_relationships_and_strangers() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let me = fx.user_with_interests("me", &["rust", "vr", "music"]);
        let friend = fx.user_with_interests("friend", &["rust"]);
        let blocked = fx.user_with_interests("blocked", &["rust", "vr"]);
        let stranger = fx.user_with_interests("stranger", &["knitting"]);
        let close = fx.user_with_interests("close", &["rust", "vr"]);
        let popular = fx.user_with_interests("popular", &["music"]);
        let quiet = fx.user_with_interests("quiet", &["vr"]);
        fx.befriend(&me, &friend)?;
        fx.graph.block(&me, &blocked)?;
        fx.graph.follow(&stranger, &popular)?;

        let recommendations = fx.graph.recommendations(&me, 10)?;
        let order: Vec<&UserId> = recommendations.iter().map(|r| &r.user).collect();
        assert_eq!(order, vec![&close, &popular, &quiet]);
        assert_eq!(recommendations[0].shared_interests, 2);
        assert_eq!(recommendations[1].follower_count, 1);
        assert_eq!(fx.graph.recommendations(&me, 1)?.len(), 1);
        Ok(())
    }
}
