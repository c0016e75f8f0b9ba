//! Client-side view of the ring: a best-effort set of known peers, kept fresh
//! by heartbeat probing and grown by asking a random survivor for its
//! successor chain. Runs on its own interval, independent of any server loop.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use rand::seq::IteratorRandom;
use ring_proto::ring::ring_client::RingClient;
use ring_proto::ring::{Empty, NodeRef, WalkQuery};
use ring_proto::HEART_RESPONSE;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

async fn connect(peer: &NodeRef) -> Option<RingClient<Channel>> {
    let endpoint = Endpoint::from_shared(format!("http://{}:{}", peer.ip, peer.port))
        .ok()?
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT);
    endpoint.connect().await.ok().map(RingClient::new)
}

/// Probes a peer's heartbeat; anything but the liveness token is a failure.
pub async fn heart(peer: &NodeRef) -> bool {
    let Some(mut client) = connect(peer).await else {
        return false;
    };
    match client.heart(Request::new(Empty {})).await {
        Ok(reply) => reply.into_inner().token == HEART_RESPONSE,
        Err(_) => false,
    }
}

/// The peer's current successor, if it answers.
pub async fn successor_of(peer: &NodeRef) -> Option<NodeRef> {
    let mut client = connect(peer).await?;
    client
        .get_successor(Request::new(Empty {}))
        .await
        .ok()
        .map(|reply| reply.into_inner())
}

/// Asks a peer to enumerate the whole ring.
pub async fn all_nodes_of(peer: &NodeRef) -> Vec<NodeRef> {
    let Some(mut client) = connect(peer).await else {
        return Vec::new();
    };
    match client
        .all_nodes(Request::new(WalkQuery { search_id: -1 }))
        .await
    {
        Ok(reply) => reply.into_inner().nodes,
        Err(_) => Vec::new(),
    }
}

/// A set of known ring peers, keyed by ring id. No ordering guarantee;
/// inserting an already-known peer is a no-op.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<u64, NodeRef>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, peer: NodeRef) {
        self.peers.entry(peer.id).or_insert(peer);
    }

    pub fn add_all(&mut self, peers: impl IntoIterator<Item = NodeRef>) {
        for peer in peers {
            self.add(peer);
        }
    }

    pub fn peers(&self) -> Vec<NodeRef> {
        self.peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn random_peer(&self) -> Option<NodeRef> {
        self.peers.values().choose(&mut rand::thread_rng()).cloned()
    }

    /// One health round: drop every peer that misses its heartbeat, then
    /// sample a survivor and adopt its successor and that successor's
    /// successor.
    pub async fn check_round(&mut self) {
        let mut dead = Vec::new();
        for (id, peer) in &self.peers {
            if !heart(peer).await {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some(peer) = self.peers.remove(&id) {
                info!("peer {} ({}:{}) dropped: no heartbeat", id, peer.ip, peer.port);
            }
        }

        let Some(sample) = self.random_peer() else {
            return;
        };
        if let Some(first) = successor_of(&sample).await {
            let second = successor_of(&first).await;
            self.add(first);
            if let Some(second) = second {
                self.add(second);
            }
        }
    }

    /// Endless tracking loop; one check round per interval.
    pub async fn run(mut self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.check_round().await;
            debug!("tracking {} peers", self.len());
        }
    }
}
