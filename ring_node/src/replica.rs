//! Replication layer: every node shadows its two predecessors' primary stores
//! in two replica slots, and every primary write fans out to the node's two
//! successors. Slot ownership follows the ring; `update_replications` runs
//! once per maintenance tick, after ring repair, and reassigns or refills
//! slots as predecessors come and go.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use ring_proto::ring::{MessageEntry, NodeRef, ReplicationData, UserEntry};
use ring_proto::ring_id;

use crate::constants::REPLICA_COUNT;
use crate::node::Node;
use crate::peer::PeerHandle;
use crate::store::{IdentityStore, SharedStore};

/// One replica slot: a store shadowing `owner`'s primary data. `owner` is
/// `None` while the slot is unassigned (ring too small, or not yet repaired).
#[derive(Debug, Clone)]
pub struct ReplicaSlot {
    pub owner: Option<PeerHandle>,
    pub store: SharedStore,
}

impl ReplicaSlot {
    pub fn empty() -> Self {
        Self {
            owner: None,
            store: IdentityStore::shared(),
        }
    }
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl Node {
    /// The node's up-to-two nearest successors, never including itself.
    pub async fn successors(&self) -> (Option<PeerHandle>, Option<PeerHandle>) {
        self.neighbor_pair(false).await
    }

    /// The node's up-to-two nearest predecessors, never including itself.
    pub async fn predecessors(&self) -> (Option<PeerHandle>, Option<PeerHandle>) {
        self.neighbor_pair(true).await
    }

    async fn neighbor_pair(&self, before: bool) -> (Option<PeerHandle>, Option<PeerHandle>) {
        let me = self.node_ref();
        let first = if before {
            self.predecessor().await
        } else {
            self.successor().await
        };
        let Some(first) = first.filter(|peer| peer.node_ref() != me) else {
            return (None, None);
        };

        let second = if before {
            first.predecessor().await
        } else {
            first.successor().await
        };
        let second = second.filter(|peer| peer.node_ref() != me);

        (Some(first), second)
    }

    /// Store selection: `None` (and the node's own id) is the primary store,
    /// any other id matches the replica slot owned by that ring id.
    pub async fn resolve_store(&self, database_id: Option<u64>) -> Option<SharedStore> {
        let Some(owner_id) = database_id else {
            return Some(self.store.clone());
        };
        if owner_id == self.id {
            return Some(self.store.clone());
        }

        let replicas = self.replicas.read().await;
        replicas
            .iter()
            .find(|slot| slot.owner.as_ref().map_or(false, |owner| owner.id() == owner_id))
            .map(|slot| slot.store.clone())
    }

    pub async fn get_users(&self, database_id: Option<u64>) -> Vec<UserEntry> {
        match self.resolve_store(database_id).await {
            Some(store) => store.read().await.users(),
            None => Vec::new(),
        }
    }

    /// Adds a user record. A primary write that succeeds is pushed to the two
    /// successors' matching replica slots; push failures are left to the next
    /// repair tick.
    pub async fn add_user(&self, user: UserEntry, database_id: Option<u64>) -> bool {
        let Some(store) = self.resolve_store(database_id).await else {
            return false;
        };
        let added = store.write().await.add_user(user.clone());
        if added && database_id.is_none() {
            let (first, second) = self.successors().await;
            for successor in [first, second].into_iter().flatten() {
                successor.add_user(user.clone(), Some(self.id)).await;
            }
        }
        added
    }

    pub async fn get_password(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self.resolve_store(database_id).await {
            Some(store) => store
                .read()
                .await
                .get_password(nickname)
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    pub async fn update_user(
        &self,
        nickname: &str,
        ip: &str,
        port: &str,
        database_id: Option<u64>,
    ) -> bool {
        let Some(store) = self.resolve_store(database_id).await else {
            return false;
        };
        let updated = store.write().await.update_user(nickname, ip, port);
        if updated && database_id.is_none() {
            let (first, second) = self.successors().await;
            for successor in [first, second].into_iter().flatten() {
                successor
                    .update_user(nickname, ip, port, Some(self.id))
                    .await;
            }
        }
        updated
    }

    pub async fn delete_user(&self, nickname: &str, database_id: Option<u64>) -> bool {
        let Some(store) = self.resolve_store(database_id).await else {
            return false;
        };
        let deleted = store.write().await.delete_user(nickname);
        if deleted && database_id.is_none() {
            let (first, second) = self.successors().await;
            for successor in [first, second].into_iter().flatten() {
                successor.delete_user(nickname, Some(self.id)).await;
            }
        }
        deleted
    }

    pub async fn get_ip_port(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self.resolve_store(database_id).await {
            Some(store) => store.read().await.get_ip_port(nickname).unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Appends a message. An unset id is stamped with the current unix time
    /// here, before fan-out, so every replica dedups on the same tuple.
    pub async fn add_message(
        &self,
        from: &str,
        to: &str,
        value: &str,
        message_id: Option<i64>,
        database_id: Option<u64>,
    ) -> bool {
        let Some(store) = self.resolve_store(database_id).await else {
            return false;
        };
        let message_id = message_id.unwrap_or_else(unix_time);
        let message = MessageEntry {
            message_id,
            from_nickname: from.to_string(),
            to_nickname: to.to_string(),
            value: value.to_string(),
        };

        let added = store.write().await.add_message(message);
        if added && database_id.is_none() {
            let (first, second) = self.successors().await;
            for successor in [first, second].into_iter().flatten() {
                successor
                    .add_message(from, to, value, Some(message_id), Some(self.id))
                    .await;
            }
        }
        added
    }

    pub async fn messages_to(&self, nickname: &str, database_id: Option<u64>) -> Vec<MessageEntry> {
        match self.resolve_store(database_id).await {
            Some(store) => store.read().await.messages_to(nickname),
            None => Vec::new(),
        }
    }

    pub async fn delete_messages_to(&self, nickname: &str, database_id: Option<u64>) -> bool {
        let Some(store) = self.resolve_store(database_id).await else {
            return false;
        };
        let deleted = store.write().await.delete_messages_to(nickname);
        if deleted && database_id.is_none() {
            let (first, second) = self.successors().await;
            for successor in [first, second].into_iter().flatten() {
                successor.delete_messages_to(nickname, Some(self.id)).await;
            }
        }
        deleted
    }

    /// Walks the successor chain for the node whose primary store knows
    /// `nickname`. `search_id` marks where the walk started; coming back
    /// around to it ends the search empty-handed.
    pub async fn nickname_identity_node(
        &self,
        nickname: &str,
        search_id: Option<u64>,
    ) -> Option<PeerHandle> {
        if search_id == Some(self.id) {
            return None;
        }
        let search_id = search_id.unwrap_or(self.id);

        if self.store.read().await.contains_user(nickname) {
            return Some(PeerHandle::Local(self.clone()));
        }

        let successor = self.successor().await?;
        successor
            .nickname_identity_node(nickname, Some(search_id))
            .await
    }

    /// Ring-keyed lookup: the node responsible for the nickname's hash.
    pub async fn search_identity_node(&self, nickname: &str) -> Option<PeerHandle> {
        let id = ring_id(nickname, self.capacity);
        self.find_successor(id).await
    }

    /// Enumerates the ring along live successors, starting here.
    pub async fn all_nodes(&self, search_id: Option<u64>) -> Vec<NodeRef> {
        if search_id == Some(self.id) {
            return Vec::new();
        }
        let search_id = search_id.unwrap_or(self.id);

        let mut nodes = vec![self.node_ref()];
        if let Some(successor) = self.successor().await {
            if successor.heart().await {
                nodes.extend(successor.all_nodes(Some(search_id)).await);
            }
        }
        nodes
    }

    /// Snapshot of the primary store, the unit served to successors that
    /// shadow this node.
    pub async fn get_replication_data(&self) -> ReplicationData {
        self.store.read().await.snapshot()
    }

    /// Folds a snapshot into the selected store; unmatched database ids are
    /// dropped silently, the pusher will try again on its next tick.
    pub async fn replicate(&self, data: ReplicationData, database_id: Option<u64>) {
        if let Some(store) = self.resolve_store(database_id).await {
            store.write().await.merge(data);
        }
    }

    /// A dead immediate predecessor makes its shadowed data ours: merge slot 0
    /// into the primary and push the merged snapshot to our own successors.
    async fn preserve_replication_data(&self) {
        let (owner, slot_store) = {
            let replicas = self.replicas.read().await;
            (replicas[0].owner.clone(), replicas[0].store.clone())
        };
        let Some(owner) = owner else {
            return;
        };
        if owner.heart().await {
            return;
        }

        info!(
            "node {}: replica owner {} is gone, taking over its data",
            self.id, owner
        );
        let orphaned = slot_store.read().await.snapshot();
        self.replicate(orphaned, None).await;

        let merged = self.get_replication_data().await;
        let (first, second) = self.successors().await;
        for successor in [first, second].into_iter().flatten() {
            successor.replicate(merged.clone(), Some(self.id)).await;
        }
    }

    /// Replication repair tick: absorb a dead predecessor's data, then bring
    /// both slots in line with the current predecessors. Owners are compared
    /// against the slots' previous owners so unchanged slots are untouched, a
    /// swapped owner reuses the sibling slot's local data, and only a
    /// genuinely new owner costs a full snapshot fetch.
    pub async fn update_replications(&self) {
        self.preserve_replication_data().await;

        let (first, second) = self.predecessors().await;
        let intended = [first, second];
        let previous: Vec<Option<PeerHandle>> = {
            let replicas = self.replicas.read().await;
            replicas.iter().map(|slot| slot.owner.clone()).collect()
        };

        // Decide every slot before touching any of them: the swap case must
        // read the sibling's data as it was before this tick.
        let mut adopted: [Option<Option<PeerHandle>>; REPLICA_COUNT] = [None, None];
        let mut incoming: [Option<ReplicationData>; REPLICA_COUNT] = [None, None];
        for k in 0..REPLICA_COUNT {
            if intended[k] == previous[k] {
                continue;
            }
            let sibling = REPLICA_COUNT - 1 - k;
            match &intended[k] {
                None => adopted[k] = Some(None),
                Some(new_owner) if previous[sibling].as_ref() == Some(new_owner) => {
                    let sibling_store = {
                        let replicas = self.replicas.read().await;
                        replicas[sibling].store.clone()
                    };
                    incoming[k] = Some(sibling_store.read().await.snapshot());
                    adopted[k] = Some(Some(new_owner.clone()));
                }
                Some(new_owner) => match new_owner.get_replication_data().await {
                    Some(data) => {
                        incoming[k] = Some(data);
                        adopted[k] = Some(Some(new_owner.clone()));
                    }
                    None => warn!(
                        "node {}: snapshot fetch from {} failed, keeping slot {} as-is",
                        self.id, new_owner, k
                    ),
                },
            }
        }

        for k in 0..REPLICA_COUNT {
            let Some(new_owner) = adopted[k].take() else {
                continue;
            };
            let slot_store = {
                let mut replicas = self.replicas.write().await;
                replicas[k].owner = new_owner;
                replicas[k].store.clone()
            };
            let mut store = slot_store.write().await;
            store.clear();
            if let Some(data) = incoming[k].take() {
                store.merge(data);
            }
        }
    }
}
