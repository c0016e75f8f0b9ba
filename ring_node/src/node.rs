//! The ring node: finger table, successor/predecessor pointers, and the
//! self-stabilizing maintenance cycle that keeps them correct under churn.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use log::{info, warn};
use rand::Rng;
use ring_proto::ring::NodeRef;
use ring_proto::HEART_RESPONSE;
use tokio::sync::RwLock;

use crate::constants::{MAX_RING_CAPACITY, REPLICA_COUNT};
use crate::interval::in_ring_interval;
use crate::peer::{PeerHandle, RemoteNode};
use crate::replica::ReplicaSlot;
use crate::store::{IdentityStore, SharedStore};

/// One finger table entry, responsible for the half-open ring interval
/// `[start, end)`. Entry 0's peer doubles as the node's successor pointer.
#[derive(Debug, Clone)]
pub struct Finger {
    pub start: u64,
    pub end: u64,
    pub peer: Option<PeerHandle>,
}

impl Finger {
    fn new(node_id: u64, capacity: u32, k: u32) -> Self {
        let modulus = 1u64 << capacity;
        let span = 1u64 << k;
        Self {
            start: (node_id + span) % modulus,
            end: (node_id + 2 * span) % modulus,
            peer: None,
        }
    }
}

#[derive(Debug)]
pub struct RingState {
    pub fingers: Vec<Finger>,
    pub predecessor: Option<PeerHandle>,
    next_finger: usize,
}

/// A ring participant. Cheap to clone; all mutable state lives behind shared
/// locks, so clones are interchangeable views of the same node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub ip: String,
    pub port: u16,
    pub capacity: u32,
    pub ring: Arc<RwLock<RingState>>,
    pub store: SharedStore,
    pub replicas: Arc<RwLock<Vec<ReplicaSlot>>>,
}

impl Node {
    pub fn new(id: u64, ip: &str, port: u16, capacity: u32) -> Result<Self> {
        if capacity == 0 || capacity > MAX_RING_CAPACITY {
            bail!(
                "ring capacity must be between 1 and {}, got {}",
                MAX_RING_CAPACITY,
                capacity
            );
        }

        let fingers = (0..capacity).map(|k| Finger::new(id, capacity, k)).collect();
        let replicas = (0..REPLICA_COUNT).map(|_| ReplicaSlot::empty()).collect();

        Ok(Self {
            id,
            ip: ip.to_string(),
            port,
            capacity,
            ring: Arc::new(RwLock::new(RingState {
                fingers,
                predecessor: None,
                next_finger: 1,
            })),
            store: IdentityStore::shared(),
            replicas: Arc::new(RwLock::new(replicas)),
        })
    }

    /// First node of a fresh network: every finger and the predecessor point
    /// back at the node itself, the one-node ring.
    pub async fn create_network(id: u64, ip: &str, port: u16, capacity: u32) -> Result<Self> {
        let node = Self::new(id, ip, port, capacity)?;
        let myself = PeerHandle::Local(node.clone());
        {
            let mut ring = node.ring.write().await;
            for finger in ring.fingers.iter_mut() {
                finger.peer = Some(myself.clone());
            }
            ring.predecessor = Some(myself);
        }
        info!(
            "node {}: created a new network (capacity {})",
            node.id, capacity
        );
        Ok(node)
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            ip: self.ip.clone(),
            port: self.port as u32,
        }
    }

    /// Turns a peer descriptor into a handle. A descriptor naming our own
    /// listening address collapses to the Local variant; anything else would
    /// leave the node forwarding to itself over the network.
    pub fn handle_for(&self, info: &NodeRef) -> PeerHandle {
        if info.ip == self.ip && info.port == self.port as u32 {
            PeerHandle::Local(self.clone())
        } else {
            PeerHandle::Remote(RemoteNode::new(info.clone(), Some(self.clone())))
        }
    }

    pub fn network_capacity(&self) -> u32 {
        self.capacity
    }

    pub fn heart(&self) -> &'static str {
        HEART_RESPONSE
    }

    pub async fn successor(&self) -> Option<PeerHandle> {
        self.ring.read().await.fingers[0].peer.clone()
    }

    pub async fn set_successor(&self, peer: PeerHandle) {
        self.ring.write().await.fingers[0].peer = Some(peer);
    }

    pub async fn predecessor(&self) -> Option<PeerHandle> {
        self.ring.read().await.predecessor.clone()
    }

    pub async fn set_predecessor(&self, peer: PeerHandle) {
        self.ring.write().await.predecessor = Some(peer);
    }

    /// True iff this node is the only member it knows about: predecessor and
    /// every finger (the successor included) point back at itself.
    pub async fn alone(&self) -> bool {
        let ring = self.ring.read().await;
        let me = self.node_ref();
        let is_me =
            |peer: &Option<PeerHandle>| peer.as_ref().map_or(false, |peer| peer.node_ref() == me);
        is_me(&ring.predecessor) && ring.fingers.iter().all(|finger| is_me(&finger.peer))
    }

    /// Highest finger strictly inside `(self.id, id)`, or self when none
    /// qualifies.
    pub async fn closest_preceding_finger(&self, id: u64) -> PeerHandle {
        let ring = self.ring.read().await;
        for finger in ring.fingers.iter().rev() {
            if let Some(peer) = &finger.peer {
                if in_ring_interval(peer.id(), self.id, id, false, false) {
                    return peer.clone();
                }
            }
        }
        PeerHandle::Local(self.clone())
    }

    /// Hops toward `id` until it falls inside `(current, current.successor]`.
    /// Stops early when a hop has no successor or offers no better finger.
    pub async fn find_predecessor(&self, id: u64) -> PeerHandle {
        let mut current = PeerHandle::Local(self.clone());
        loop {
            let Some(successor) = current.successor().await else {
                break;
            };
            if in_ring_interval(id, current.id(), successor.id(), false, true) {
                break;
            }
            let Some(closest) = current.closest_preceding_finger(id).await else {
                break;
            };
            if closest == current {
                break;
            }
            current = closest;
        }
        current
    }

    pub async fn find_successor(&self, id: u64) -> Option<PeerHandle> {
        self.find_predecessor(id).await.successor().await
    }

    /// Joins an existing ring through `known`. Both failure modes are fatal:
    /// a ring that answers nothing is unusable, and a successor carrying our
    /// own ID means this address hashes onto an already-taken point.
    pub async fn join_network(&self, known: PeerHandle) -> Result<()> {
        let Some(successor) = known.find_successor(self.id).await else {
            bail!(
                "join through {} failed: no successor found for id {}",
                known,
                self.id
            );
        };
        if successor.id() == self.id {
            bail!("a node with id {} already exists in the ring", self.id);
        }

        info!("node {}: joined, successor is {}", self.id, successor);
        self.set_successor(successor).await;
        Ok(())
    }

    /// A peer introduces itself as a predecessor candidate; adopt it when we
    /// have none, or when it sits between the current predecessor and us.
    pub async fn notify(&self, candidate: PeerHandle) {
        let mut ring = self.ring.write().await;
        let adopt = match &ring.predecessor {
            None => true,
            Some(current) => in_ring_interval(candidate.id(), current.id(), self.id, false, false),
        };
        if adopt {
            ring.predecessor = Some(candidate);
        }
    }

    /// One stabilization round: adopt the successor's predecessor when it sits
    /// between us and the successor, then make sure the (possibly new)
    /// successor has heard of us.
    pub async fn stabilize(&self) {
        let Some(old_successor) = self.successor().await else {
            return;
        };

        if let Some(between) = old_successor.predecessor().await {
            if in_ring_interval(between.id(), self.id, old_successor.id(), false, false) {
                self.set_successor(between).await;
            }
        }

        if let Some(successor) = self.successor().await {
            successor.notify(PeerHandle::Local(self.clone())).await;
        }
    }

    /// Probes the successor's heartbeat. On failure, walks the finger table
    /// for a live replacement, clearing entries that still point at the dead
    /// peer; with no replacement left the node reverts to a one-node ring.
    pub async fn check_successor(&self) {
        let Some(successor) = self.successor().await else {
            return;
        };
        if successor.heart().await {
            return;
        }
        warn!(
            "node {}: successor {} stopped answering, looking for a replacement",
            self.id, successor
        );

        let candidates: Vec<(usize, PeerHandle)> = {
            let ring = self.ring.read().await;
            ring.fingers
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(k, finger)| finger.peer.clone().map(|peer| (k, peer)))
                .collect()
        };

        let mut stale = Vec::new();
        let mut replacement = None;
        for (k, peer) in candidates {
            if peer == successor {
                stale.push(k);
            } else if peer.heart().await {
                replacement = Some(peer);
                break;
            }
        }

        {
            let mut ring = self.ring.write().await;
            for k in &stale {
                if ring.fingers[*k]
                    .peer
                    .as_ref()
                    .map_or(false, |peer| *peer == successor)
                {
                    ring.fingers[*k].peer = None;
                }
            }
            match &replacement {
                Some(peer) => ring.fingers[0].peer = Some(peer.clone()),
                None => {
                    let myself = PeerHandle::Local(self.clone());
                    ring.fingers[0].peer = Some(myself.clone());
                    ring.predecessor = Some(myself);
                }
            }
        }

        match replacement {
            Some(peer) => {
                peer.set_predecessor(PeerHandle::Local(self.clone())).await;
                info!("node {}: new successor is {}", self.id, peer);
            }
            None => info!(
                "node {}: no live peer left in the finger table, now alone",
                self.id
            ),
        }
    }

    /// Recomputes the finger at the cycling index, plus one more picked at
    /// random; the extra refresh speeds up convergence after churn.
    pub async fn fix_fingers(&self) {
        if self.capacity <= 1 {
            return;
        }

        let (index, extra) = {
            let mut ring = self.ring.write().await;
            let index = ring.next_finger;
            ring.next_finger += 1;
            if ring.next_finger >= self.capacity as usize {
                ring.next_finger = 1;
            }
            let extra = rand::thread_rng().gen_range(1..self.capacity as usize);
            (index, extra)
        };

        self.refresh_finger(index).await;
        if extra != index {
            self.refresh_finger(extra).await;
        }
    }

    async fn refresh_finger(&self, index: usize) {
        let start = self.ring.read().await.fingers[index].start;
        let peer = self.find_successor(start).await;
        self.ring.write().await.fingers[index].peer = peer;
    }

    /// Endless self-repair cycle, one pass per tick: successor liveness,
    /// stabilization, finger refresh, then replication repair, so that
    /// replication never acts on stale topology. Never exits.
    pub async fn run_maintenance(self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.check_successor().await;
            self.stabilize().await;
            self.fix_fingers().await;
            self.update_replications().await;
        }
    }
}
