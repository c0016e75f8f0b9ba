//! In-memory user/message store. One node owns three instances: its primary
//! store plus one per replica slot. Persistent storage sits behind this same
//! interface and is out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use ring_proto::ring::{MessageEntry, ReplicationData, UserEntry};
use tokio::sync::RwLock;

pub type SharedStore = Arc<RwLock<IdentityStore>>;

#[derive(Debug, Default)]
pub struct IdentityStore {
    users: HashMap<String, UserEntry>,
    messages: Vec<MessageEntry>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Inserts a user record. The nickname is the unique key; inserting an
    /// already-known nickname is rejected.
    pub fn add_user(&mut self, user: UserEntry) -> bool {
        if self.users.contains_key(&user.nickname) {
            return false;
        }
        self.users.insert(user.nickname.clone(), user);
        true
    }

    pub fn contains_user(&self, nickname: &str) -> bool {
        self.users.contains_key(nickname)
    }

    pub fn get_password(&self, nickname: &str) -> Option<String> {
        self.users.get(nickname).map(|user| user.password.clone())
    }

    pub fn update_user(&mut self, nickname: &str, ip: &str, port: &str) -> bool {
        match self.users.get_mut(nickname) {
            Some(user) => {
                user.ip = ip.to_string();
                user.port = port.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete_user(&mut self, nickname: &str) -> bool {
        self.users.remove(nickname).is_some()
    }

    pub fn get_ip_port(&self, nickname: &str) -> Option<String> {
        self.users
            .get(nickname)
            .map(|user| format!("{}:{}", user.ip, user.port))
    }

    pub fn users(&self) -> Vec<UserEntry> {
        let mut users: Vec<UserEntry> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        users
    }

    /// Appends a message. Duplicates are rejected on the exact
    /// `(id, from, to, value)` tuple.
    pub fn add_message(&mut self, message: MessageEntry) -> bool {
        if self.messages.iter().any(|known| *known == message) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> Vec<MessageEntry> {
        self.messages.clone()
    }

    pub fn messages_to(&self, nickname: &str) -> Vec<MessageEntry> {
        self.messages
            .iter()
            .filter(|message| message.to_nickname == nickname)
            .cloned()
            .collect()
    }

    pub fn delete_messages_to(&mut self, nickname: &str) -> bool {
        self.messages.retain(|message| message.to_nickname != nickname);
        true
    }

    pub fn clear(&mut self) -> bool {
        self.users.clear();
        self.messages.clear();
        true
    }

    /// Full copy of the store's contents, the unit of replication transfer.
    pub fn snapshot(&self) -> ReplicationData {
        ReplicationData {
            users: self.users(),
            messages: self.messages.clone(),
        }
    }

    /// Folds a snapshot into the store under the usual insert semantics:
    /// already-present users and exact-duplicate messages are skipped.
    pub fn merge(&mut self, data: ReplicationData) {
        for user in data.users {
            self.add_user(user);
        }
        for message in data.messages {
            self.add_message(message);
        }
    }
}
