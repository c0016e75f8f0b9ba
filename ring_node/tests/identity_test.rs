use std::time::Duration;

use ring_proto::ring::UserEntry;
use ring_proto::ring_id;

mod common;
use common::{stabilize_ring, start_network_node, start_node};

fn user(nickname: &str, ip: &str, port: &str) -> UserEntry {
    UserEntry {
        nickname: nickname.to_string(),
        password: "pw".to_string(),
        ip: ip.to_string(),
        port: port.to_string(),
    }
}

async fn converged_ring(
    base_port: u16,
) -> (Vec<ring_node::Node>, Vec<tokio::task::JoinHandle<()>>) {
    const CAPACITY: u32 = 6;

    let (first, h0) = start_network_node(1, base_port, CAPACITY).await;
    let mut nodes = vec![first];
    let mut handles = vec![h0];

    for (k, id) in [17u64, 33].into_iter().enumerate() {
        let (node, handle) = start_node(id, base_port + 1 + k as u16, CAPACITY).await;
        let bootstrap = node.handle_for(&nodes[0].node_ref());
        node.join_network(bootstrap).await.unwrap();
        nodes.push(node);
        handles.push(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    stabilize_ring(&nodes, 12).await;
    (nodes, handles)
}

#[tokio::test]
async fn nickname_walk_finds_the_registering_node() {
    let (nodes, _handles) = converged_ring(60400).await;

    assert!(nodes[1].add_user(user("alice", "10.0.0.1", "9000"), None).await);

    // The walk starts anywhere and lands on the node holding the nickname.
    for node in &nodes {
        let found = node.nickname_identity_node("alice", None).await;
        assert_eq!(found.expect("alice is registered").id(), 17);
    }

    // An unknown nickname walks the whole ring and comes back empty.
    for node in &nodes {
        assert!(node.nickname_identity_node("nobody", None).await.is_none());
    }
}

#[tokio::test]
async fn search_routes_by_nickname_hash() {
    let (nodes, _handles) = converged_ring(60410).await;

    let nickname = "alice";
    let key = ring_id(nickname, 6);
    let expected = [1u64, 17, 33]
        .into_iter()
        .find(|id| *id >= key)
        .unwrap_or(1);

    for node in &nodes {
        let responsible = node.search_identity_node(nickname).await;
        assert_eq!(responsible.expect("lookup failed").id(), expected);
    }
}

#[tokio::test]
async fn all_nodes_enumerates_the_ring() {
    let (nodes, _handles) = converged_ring(60420).await;

    for node in &nodes {
        let mut ids: Vec<u64> = node
            .all_nodes(None)
            .await
            .into_iter()
            .map(|peer| peer.id)
            .collect();
        assert_eq!(ids.len(), 3, "walk from node {}", node.id);
        assert_eq!(ids[0], node.id, "walk starts at the asking node");
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 17, 33]);
    }
}

#[tokio::test]
async fn user_lookups_answer_from_the_primary() {
    let (nodes, _handles) = converged_ring(60430).await;

    assert!(nodes[0].add_user(user("bob", "10.0.0.2", "9100"), None).await);

    assert_eq!(nodes[0].get_password("bob", None).await, "pw");
    assert_eq!(nodes[0].get_ip_port("bob", None).await, "10.0.0.2:9100");
    assert_eq!(nodes[0].get_password("ghost", None).await, "");

    assert!(nodes[0].update_user("bob", "10.0.0.3", "9200", None).await);
    assert_eq!(nodes[0].get_ip_port("bob", None).await, "10.0.0.3:9200");

    // The update also reached the successor's replica slot.
    let replicas = nodes[1].replicas.read().await;
    let shadow = replicas[0].store.read().await;
    assert_eq!(shadow.get_ip_port("bob"), Some("10.0.0.3:9200".to_string()));
}

#[tokio::test]
async fn unmatched_replica_writes_are_rejected() {
    let (nodes, _handles) = converged_ring(60440).await;

    // database_id 50 owns no slot on node 1; the write reports failure.
    assert!(!nodes[0].add_user(user("eve", "10.0.0.9", "9999"), Some(50)).await);
    assert!(nodes[0].get_users(Some(50)).await.is_empty());
}
