use std::net::SocketAddr;
use std::time::Duration;

use ring_node::Node;
use ring_proto::ring::ring_server::RingServer;
use tokio::net::TcpListener;
use tonic::transport::Server;

/// Serves a node's gRPC surface in a background task. Returns the node and
/// the server task handle; aborting the handle simulates a crash.
pub async fn serve_node(node: Node) -> tokio::task::JoinHandle<()> {
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

    // Give it a moment to start
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle
}

/// First node of a fresh ring, served.
#[allow(dead_code)]
pub async fn start_network_node(
    id: u64,
    port: u16,
    capacity: u32,
) -> (Node, tokio::task::JoinHandle<()>) {
    let node = Node::create_network(id, "127.0.0.1", port, capacity)
        .await
        .unwrap();
    let handle = serve_node(node.clone()).await;
    (node, handle)
}

/// A joiner, served but not yet part of any ring.
#[allow(dead_code)]
pub async fn start_node(id: u64, port: u16, capacity: u32) -> (Node, tokio::task::JoinHandle<()>) {
    let node = Node::new(id, "127.0.0.1", port, capacity).unwrap();
    let handle = serve_node(node.clone()).await;
    (node, handle)
}

/// Runs full maintenance ticks on every node, in order, for a number of
/// rounds.
#[allow(dead_code)]
pub async fn stabilize_ring(nodes: &[Node], rounds: usize) {
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
