use std::collections::BTreeSet;
use std::sync::Arc;

use agora_common::{NewAccount, NotificationKind, UserId};
use anyhow::anyhow;
use sled::Db;

use crate::graph::SocialGraph;
use crate::notify::{Notifications, Notifier};
use crate::users::Users;

pub struct Fixture {
    pub db: Db,
    pub users: Users,
    pub notifications: Notifications,
    pub graph: SocialGraph,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::build(Some(notifier))
    }

    fn build(notifier: Option<Arc<dyn Notifier>>) -> Self {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let users = Users::new(&db).unwrap();
        let notifications = Notifications::new(&db).unwrap();
        let notifier: Arc<dyn Notifier> = match notifier {
            Some(notifier) => notifier,
            None => Arc::new(notifications.clone()),
        };
        let graph = SocialGraph::new(&db, Arc::new(users.clone()), notifier).unwrap();
        Self {
            db,
            users,
            notifications,
            graph,
        }
    }

    fn register(&self, username: &str, private: bool, interests: &[&str]) -> UserId {
        self.users
            .register(NewAccount {
                username: username.to_string(),
                private,
                interests: interests.iter().map(|i| i.to_string()).collect::<BTreeSet<_>>(),
            })
            .unwrap()
            .account
            .id
    }

    pub fn user(&self, username: &str) -> UserId {
        self.register(username, false, &[])
    }

    pub fn private_user(&self, username: &str) -> UserId {
        self.register(username, true, &[])
    }

    pub fn user_with_interests(&self, username: &str, interests: &[&str]) -> UserId {
        self.register(username, false, interests)
    }

    pub fn befriend(&self, a: &UserId, b: &UserId) -> anyhow::Result<()> {
        let request = self.graph.send_friend_request(a, b)?;
        self.graph.accept_friend_request(&request.uuid, b)?;
        Ok(())
    }
}

pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _recipient: &UserId, _actor: &UserId, _kind: NotificationKind) -> anyhow::Result<()> {
        Err(anyhow!("notification backend unavailable"))
    }
}
