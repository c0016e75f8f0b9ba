use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::info;
use ring_proto::ring::ring_server::RingServer;
use ring_proto::ring::NodeRef;
use ring_proto::ring_id;
use tonic::transport::Server;

use ring_node::constants::{
    DEFAULT_PORT, DEFAULT_RING_CAPACITY, LOCALHOST, MAINTENANCE_INTERVAL_MS,
};
use ring_node::peer::{PeerHandle, RemoteNode};
use ring_node::Node;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = LOCALHOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// ip:port of a ring member to join through; omit to create a new network
    #[arg(short, long)]
    join: Option<String>,

    /// Ring bit-width when creating a new network; joiners adopt the ring's
    #[arg(short, long, default_value_t = DEFAULT_RING_CAPACITY)]
    capacity: u32,

    /// Milliseconds between maintenance ticks
    #[arg(short, long, default_value_t = MAINTENANCE_INTERVAL_MS)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let addr_str = format!("{}:{}", args.host, args.port);
    let addr: SocketAddr = addr_str
        .parse()
        .with_context(|| format!("invalid listen address {addr_str}"))?;

    let node = match &args.join {
        Some(join_addr) => {
            // The ring's capacity was fixed when the network was created;
            // ask the bootstrap peer for it instead of trusting our flag.
            let bootstrap = RemoteNode::new(parse_peer_addr(join_addr, 0)?, None);
            let Some(capacity) = bootstrap.network_capacity().await else {
                bail!("bootstrap peer {join_addr} did not answer a capacity query");
            };

            let id = ring_id(&addr_str, capacity);
            let node = Node::new(id, &args.host, args.port, capacity)?;
            info!("node {id} starting at {addr_str} (capacity {capacity})");

            let peer_info = parse_peer_addr(join_addr, ring_id(join_addr, capacity))?;
            let known = PeerHandle::Remote(RemoteNode::new(peer_info, Some(node.clone())));
            node.join_network(known).await?;
            node
        }
        None => {
            let id = ring_id(&addr_str, args.capacity);
            info!("node {id} starting at {addr_str} (capacity {})", args.capacity);
            Node::create_network(id, &args.host, args.port, args.capacity).await?
        }
    };

    tokio::spawn(
        node.clone()
            .run_maintenance(Duration::from_millis(args.interval)),
    );

    info!("listening on {addr}");
    Server::builder()
        .add_service(RingServer::new(node))
        .serve(addr)
        .await?;

    Ok(())
}

fn parse_peer_addr(addr: &str, id: u64) -> anyhow::Result<NodeRef> {
    let (ip, port) = addr
        .split_once(':')
        .ok_or_else(|| anyhow!("peer address must be ip:port, got {addr}"))?;
    Ok(NodeRef {
        id,
        ip: ip.to_string(),
        port: port.parse().with_context(|| format!("bad port in {addr}"))?,
    })
}
