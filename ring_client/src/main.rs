use clap::{Parser, Subcommand};
use ring_client::PeerSet;
use ring_proto::ring::ring_client::RingClient;
use ring_proto::ring::{
    AddMessageRequest, AddUserRequest, NicknameQuery, NicknameRequest, NodeRef, UserEntry,
    UserQuery, WalkQuery,
};
use tonic::transport::Channel;
use tonic::Request;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of a ring node to talk to
    #[arg(short, long, default_value = "http://127.0.0.1:8030")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user at the node responsible for the nickname
    AddUser {
        nickname: String,
        password: String,
        ip: String,
        port: String,
    },
    /// Store a message at the recipient's identity node
    SendMessage {
        from: String,
        to: String,
        message: String,
    },
    /// List messages addressed to a nickname
    Messages { nickname: String },
    /// Find the node responsible for a nickname
    Lookup { nickname: String },
    /// Enumerate the ring as JSON
    Nodes,
    /// Track ring membership with periodic heartbeat rounds
    Watch {
        /// Milliseconds between rounds
        #[arg(short, long, default_value_t = 1000)]
        interval: u64,
    },
}

async fn connect_to(peer: &NodeRef) -> Result<RingClient<Channel>, Box<dyn std::error::Error>> {
    Ok(RingClient::connect(format!("http://{}:{}", peer.ip, peer.port)).await?)
}

/// The node whose primary store holds `nickname`, found by walking the ring
/// from the entry node.
async fn identity_node_of(
    client: &mut RingClient<Channel>,
    nickname: &str,
) -> Result<NodeRef, Box<dyn std::error::Error>> {
    let response = client
        .nickname_identity_node(Request::new(NicknameQuery {
            nickname: nickname.to_string(),
            search_id: -1,
        }))
        .await?;
    Ok(response.into_inner())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut client = RingClient::connect(cli.node.clone()).await?;

    match cli.command {
        Commands::AddUser {
            nickname,
            password,
            ip,
            port,
        } => {
            let home = client
                .search_identity_node(Request::new(NicknameRequest {
                    nickname: nickname.clone(),
                }))
                .await?
                .into_inner();

            let mut home_client = connect_to(&home).await?;
            let response = home_client
                .add_user(Request::new(AddUserRequest {
                    user: Some(UserEntry {
                        nickname,
                        password,
                        ip,
                        port,
                    }),
                    database_id: -1,
                }))
                .await?;

            if response.into_inner().success {
                println!("User registered at node {}", home.id);
            } else {
                println!("Registration failed (nickname taken?)");
            }
        }
        Commands::SendMessage { from, to, message } => {
            let home = identity_node_of(&mut client, &to).await?;
            let mut home_client = connect_to(&home).await?;
            let response = home_client
                .add_message(Request::new(AddMessageRequest {
                    from_nickname: from,
                    to_nickname: to,
                    value: message,
                    message_id: -1,
                    database_id: -1,
                }))
                .await?;

            if response.into_inner().success {
                println!("Message stored at node {}", home.id);
            } else {
                println!("Send failed");
            }
        }
        Commands::Messages { nickname } => {
            let home = identity_node_of(&mut client, &nickname).await?;
            let mut home_client = connect_to(&home).await?;
            let messages = home_client
                .messages_to(Request::new(UserQuery {
                    nickname,
                    database_id: -1,
                }))
                .await?
                .into_inner()
                .messages;

            if messages.is_empty() {
                println!("No messages");
            }
            for message in messages {
                println!("{}: {}", message.from_nickname, message.value);
            }
        }
        Commands::Lookup { nickname } => {
            let node = client
                .search_identity_node(Request::new(NicknameRequest { nickname }))
                .await?
                .into_inner();
            println!("Responsible node: id={} at {}:{}", node.id, node.ip, node.port);
        }
        Commands::Nodes => {
            let nodes = client
                .all_nodes(Request::new(WalkQuery { search_id: -1 }))
                .await?
                .into_inner()
                .nodes;
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        Commands::Watch { interval } => {
            let mut peers = PeerSet::new();
            let nodes = client
                .all_nodes(Request::new(WalkQuery { search_id: -1 }))
                .await?
                .into_inner()
                .nodes;
            peers.add_all(nodes);
            println!("Seeded with {} peers", peers.len());

            loop {
                tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
                peers.check_round().await;
                let mut known = peers.peers();
                known.sort_by_key(|peer| peer.id);
                let listing: Vec<String> = known
                    .iter()
                    .map(|peer| format!("{} ({}:{})", peer.id, peer.ip, peer.port))
                    .collect();
                println!("Alive: [{}]", listing.join(", "));
            }
        }
    }

    Ok(())
}
