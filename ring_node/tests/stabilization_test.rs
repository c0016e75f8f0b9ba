use std::time::Duration;

mod common;
use common::{stabilize_ring, start_network_node, start_node};

/// Follows successor pointers from `start`, collecting ids until the walk
/// comes back around.
async fn successor_cycle(start: &ring_node::Node, hops: usize) -> Vec<u64> {
    let mut seen = Vec::new();
    let mut current = start.successor().await.expect("no successor");
    for _ in 0..hops {
        seen.push(current.id());
        current = current.successor().await.expect("broken ring");
    }
    seen
}

async fn predecessor_cycle(start: &ring_node::Node, hops: usize) -> Vec<u64> {
    let mut seen = Vec::new();
    let mut current = start.predecessor().await.expect("no predecessor");
    for _ in 0..hops {
        seen.push(current.id());
        current = current.predecessor().await.expect("broken ring");
    }
    seen
}

#[tokio::test]
async fn sequential_joins_converge_to_one_cycle() {
    const BASE_PORT: u16 = 60100;
    const CAPACITY: u32 = 6;
    let ids = [1u64, 17, 33, 49];

    let (first, _h0) = start_network_node(ids[0], BASE_PORT, CAPACITY).await;
    let mut nodes = vec![first];
    let mut handles = Vec::new();

    for (k, id) in ids.iter().enumerate().skip(1) {
        let (node, handle) = start_node(*id, BASE_PORT + k as u16, CAPACITY).await;
        let bootstrap = node.handle_for(&nodes[0].node_ref());
        node.join_network(bootstrap).await.unwrap();
        nodes.push(node);
        handles.push(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    stabilize_ring(&nodes, 12).await;

    // Successor traversal visits every node exactly once, in ring order.
    assert_eq!(successor_cycle(&nodes[0], 4).await, vec![17, 33, 49, 1]);
    assert_eq!(successor_cycle(&nodes[2], 4).await, vec![49, 1, 17, 33]);

    // Predecessor traversal is the reverse walk.
    assert_eq!(predecessor_cycle(&nodes[0], 4).await, vec![49, 33, 17, 1]);
}

#[tokio::test]
async fn dead_successor_is_replaced_by_a_live_finger() {
    const BASE_PORT: u16 = 60200;
    const CAPACITY: u32 = 6;

    let (a, _ha) = start_network_node(1, BASE_PORT, CAPACITY).await;
    let (b, hb) = start_node(17, BASE_PORT + 1, CAPACITY).await;
    let (c, _hc) = start_node(33, BASE_PORT + 2, CAPACITY).await;

    b.join_network(b.handle_for(&a.node_ref())).await.unwrap();
    c.join_network(c.handle_for(&a.node_ref())).await.unwrap();

    let nodes = [a.clone(), b.clone(), c.clone()];
    stabilize_ring(&nodes, 12).await;
    assert_eq!(successor_cycle(&a, 3).await, vec![17, 33, 1]);

    // Kill B; A's next liveness check must promote C.
    hb.abort();
    tokio::time::sleep(Duration::from_millis(200)).await;

    a.check_successor().await;
    assert_eq!(a.successor().await.unwrap().id(), 33);
    assert_eq!(c.predecessor().await.unwrap().id(), 1);

    let survivors = [a.clone(), c.clone()];
    stabilize_ring(&survivors, 8).await;

    assert_eq!(successor_cycle(&a, 2).await, vec![33, 1]);
    assert_eq!(predecessor_cycle(&a, 2).await, vec![33, 1]);
}

#[tokio::test]
async fn last_node_standing_collapses_to_a_one_node_ring() {
    const BASE_PORT: u16 = 60250;
    const CAPACITY: u32 = 6;

    let (a, _ha) = start_network_node(1, BASE_PORT, CAPACITY).await;
    let (b, hb) = start_node(17, BASE_PORT + 1, CAPACITY).await;

    b.join_network(b.handle_for(&a.node_ref())).await.unwrap();
    let nodes = [a.clone(), b.clone()];
    stabilize_ring(&nodes, 8).await;
    assert_eq!(a.successor().await.unwrap().id(), 17);

    hb.abort();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Enough ticks for the cycling finger refresh to sweep the whole table.
    stabilize_ring(&[a.clone()], 8).await;
    assert!(a.alone().await);
}
