use std::net::SocketAddr;
use std::time::Duration;

use ring_client::PeerSet;
use ring_node::Node;
use ring_proto::ring::ring_server::RingServer;
use tokio::net::TcpListener;
use tonic::transport::Server;

async fn serve(node: Node) -> tokio::task::JoinHandle<()> {
    let serving = node.clone();
    let port = node.port;
    let handle = tokio::spawn(async move {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let listener = TcpListener::bind(addr).await.unwrap();
        Server::builder()
            .add_service(RingServer::new(serving))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle
}

async fn stabilize(nodes: &[Node], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.check_successor().await;
            node.stabilize().await;
            node.fix_fingers().await;
            node.update_replications().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn peer_set_grows_through_successors_and_prunes_the_dead() {
    const BASE_PORT: u16 = 60500;
    const CAPACITY: u32 = 6;

    let a = Node::create_network(1, "127.0.0.1", BASE_PORT, CAPACITY)
        .await
        .unwrap();
    let _ha = serve(a.clone()).await;

    let b = Node::new(17, "127.0.0.1", BASE_PORT + 1, CAPACITY).unwrap();
    let hb = serve(b.clone()).await;
    b.join_network(b.handle_for(&a.node_ref())).await.unwrap();

    let c = Node::new(33, "127.0.0.1", BASE_PORT + 2, CAPACITY).unwrap();
    let _hc = serve(c.clone()).await;
    c.join_network(c.handle_for(&a.node_ref())).await.unwrap();

    let nodes = [a.clone(), b.clone(), c.clone()];
    stabilize(&nodes, 12).await;

    // Seeded with one peer, a single round discovers the successor chain.
    let mut peers = PeerSet::new();
    peers.add(a.node_ref());
    peers.check_round().await;
    assert_eq!(peers.len(), 3);

    // Re-adding known peers is a no-op.
    peers.add(a.node_ref());
    assert_eq!(peers.len(), 3);

    // Kill B and let the ring repair itself; the tracker then drops B and
    // stops re-learning it from the survivors.
    hb.abort();
    tokio::time::sleep(Duration::from_millis(200)).await;
    stabilize(&[a.clone(), c.clone()], 8).await;

    peers.check_round().await;
    peers.check_round().await;

    let alive: Vec<u64> = peers.peers().iter().map(|peer| peer.id).collect();
    assert_eq!(peers.len(), 2);
    assert!(alive.contains(&1) && alive.contains(&33));
}
