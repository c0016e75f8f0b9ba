//! Peer handles: one call surface over ring participants, whether the peer is
//! the process's own node (direct calls) or a remote one (gRPC). Remote
//! failures never escape this boundary; they collapse to `None`/`false`/empty
//! results and the next maintenance tick takes care of recovery.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use ring_proto::ring::ring_client::RingClient;
use ring_proto::ring::{
    AddMessageRequest, AddUserRequest, Empty, IdRequest, MessageEntry, NicknameQuery,
    NicknameRequest, NodeRef, ReplicateRequest, ReplicationData, StoreQuery, UpdateUserRequest,
    UserEntry, UserQuery, WalkQuery,
};
use ring_proto::HEART_RESPONSE;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};

use crate::constants::{CONNECT_TIMEOUT_MS, REQUEST_TIMEOUT_MS};
use crate::node::Node;

/// Store selector: `None` is the peer's primary store, `Some(id)` the replica
/// slot owned by ring id `id`. Encoded as `-1`/id on the wire.
pub fn to_wire_id(id: Option<u64>) -> i64 {
    id.map_or(-1, |id| id as i64)
}

pub fn from_wire_id(raw: i64) -> Option<u64> {
    (raw >= 0).then_some(raw as u64)
}

pub fn to_wire_message_id(id: Option<i64>) -> i64 {
    id.unwrap_or(-1)
}

pub fn from_wire_message_id(raw: i64) -> Option<i64> {
    (raw >= 0).then_some(raw)
}

/// A reference to a ring participant.
///
/// The set of operations is closed and identical on both variants, so the
/// ring and replication algorithms never care where a peer lives.
#[derive(Clone)]
pub enum PeerHandle {
    Local(Node),
    Remote(RemoteNode),
}

impl PeerHandle {
    pub fn id(&self) -> u64 {
        match self {
            PeerHandle::Local(node) => node.id,
            PeerHandle::Remote(remote) => remote.info.id,
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        match self {
            PeerHandle::Local(node) => node.node_ref(),
            PeerHandle::Remote(remote) => remote.info.clone(),
        }
    }

    pub async fn successor(&self) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => node.successor().await,
            PeerHandle::Remote(remote) => remote.successor().await,
        }
    }

    pub async fn set_successor(&self, target: PeerHandle) {
        match self {
            PeerHandle::Local(node) => node.set_successor(target).await,
            PeerHandle::Remote(remote) => remote.set_successor(target.node_ref()).await,
        }
    }

    pub async fn predecessor(&self) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => node.predecessor().await,
            PeerHandle::Remote(remote) => remote.predecessor().await,
        }
    }

    pub async fn set_predecessor(&self, target: PeerHandle) {
        match self {
            PeerHandle::Local(node) => node.set_predecessor(target).await,
            PeerHandle::Remote(remote) => remote.set_predecessor(target.node_ref()).await,
        }
    }

    pub async fn closest_preceding_finger(&self, id: u64) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => Some(node.closest_preceding_finger(id).await),
            PeerHandle::Remote(remote) => remote.closest_preceding_finger(id).await,
        }
    }

    pub async fn find_successor(&self, id: u64) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => node.find_successor(id).await,
            PeerHandle::Remote(remote) => remote.find_successor(id).await,
        }
    }

    pub async fn notify(&self, candidate: PeerHandle) {
        match self {
            PeerHandle::Local(node) => node.notify(candidate).await,
            PeerHandle::Remote(remote) => remote.notify(candidate.node_ref()).await,
        }
    }

    pub async fn heart(&self) -> bool {
        match self {
            PeerHandle::Local(_) => true,
            PeerHandle::Remote(remote) => remote.heart().await,
        }
    }

    pub async fn network_capacity(&self) -> Option<u32> {
        match self {
            PeerHandle::Local(node) => Some(node.capacity),
            PeerHandle::Remote(remote) => remote.network_capacity().await,
        }
    }

    pub async fn get_users(&self, database_id: Option<u64>) -> Vec<UserEntry> {
        match self {
            PeerHandle::Local(node) => node.get_users(database_id).await,
            PeerHandle::Remote(remote) => remote.get_users(database_id).await,
        }
    }

    pub async fn add_user(&self, user: UserEntry, database_id: Option<u64>) -> bool {
        match self {
            // Boxed: node A's fan-out reaches an in-process node B running the
            // same operation, which would otherwise make this future infinite.
            PeerHandle::Local(node) => Box::pin(node.add_user(user, database_id)).await,
            PeerHandle::Remote(remote) => remote.add_user(user, database_id).await,
        }
    }

    pub async fn get_password(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self {
            PeerHandle::Local(node) => node.get_password(nickname, database_id).await,
            PeerHandle::Remote(remote) => remote.get_password(nickname, database_id).await,
        }
    }

    pub async fn update_user(
        &self,
        nickname: &str,
        ip: &str,
        port: &str,
        database_id: Option<u64>,
    ) -> bool {
        match self {
            PeerHandle::Local(node) => {
                Box::pin(node.update_user(nickname, ip, port, database_id)).await
            }
            PeerHandle::Remote(remote) => remote.update_user(nickname, ip, port, database_id).await,
        }
    }

    pub async fn delete_user(&self, nickname: &str, database_id: Option<u64>) -> bool {
        match self {
            PeerHandle::Local(node) => Box::pin(node.delete_user(nickname, database_id)).await,
            PeerHandle::Remote(remote) => remote.delete_user(nickname, database_id).await,
        }
    }

    pub async fn get_ip_port(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self {
            PeerHandle::Local(node) => node.get_ip_port(nickname, database_id).await,
            PeerHandle::Remote(remote) => remote.get_ip_port(nickname, database_id).await,
        }
    }

    pub async fn add_message(
        &self,
        from: &str,
        to: &str,
        value: &str,
        message_id: Option<i64>,
        database_id: Option<u64>,
    ) -> bool {
        match self {
            PeerHandle::Local(node) => {
                Box::pin(node.add_message(from, to, value, message_id, database_id)).await
            }
            PeerHandle::Remote(remote) => {
                remote
                    .add_message(from, to, value, message_id, database_id)
                    .await
            }
        }
    }

    pub async fn messages_to(&self, nickname: &str, database_id: Option<u64>) -> Vec<MessageEntry> {
        match self {
            PeerHandle::Local(node) => node.messages_to(nickname, database_id).await,
            PeerHandle::Remote(remote) => remote.messages_to(nickname, database_id).await,
        }
    }

    pub async fn delete_messages_to(&self, nickname: &str, database_id: Option<u64>) -> bool {
        match self {
            PeerHandle::Local(node) => {
                Box::pin(node.delete_messages_to(nickname, database_id)).await
            }
            PeerHandle::Remote(remote) => remote.delete_messages_to(nickname, database_id).await,
        }
    }

    pub async fn nickname_identity_node(
        &self,
        nickname: &str,
        search_id: Option<u64>,
    ) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => {
                Box::pin(node.nickname_identity_node(nickname, search_id)).await
            }
            PeerHandle::Remote(remote) => remote.nickname_identity_node(nickname, search_id).await,
        }
    }

    pub async fn search_identity_node(&self, nickname: &str) -> Option<PeerHandle> {
        match self {
            PeerHandle::Local(node) => node.search_identity_node(nickname).await,
            PeerHandle::Remote(remote) => remote.search_identity_node(nickname).await,
        }
    }

    pub async fn get_replication_data(&self) -> Option<ReplicationData> {
        match self {
            PeerHandle::Local(node) => Some(node.get_replication_data().await),
            PeerHandle::Remote(remote) => remote.get_replication_data().await,
        }
    }

    pub async fn replicate(&self, data: ReplicationData, database_id: Option<u64>) {
        match self {
            PeerHandle::Local(node) => node.replicate(data, database_id).await,
            PeerHandle::Remote(remote) => remote.replicate(data, database_id).await,
        }
    }

    pub async fn all_nodes(&self, search_id: Option<u64>) -> Vec<NodeRef> {
        match self {
            PeerHandle::Local(node) => Box::pin(node.all_nodes(search_id)).await,
            PeerHandle::Remote(remote) => remote.all_nodes(search_id).await,
        }
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node_ref() == other.node_ref()
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.node_ref();
        let kind = match self {
            PeerHandle::Local(_) => "Local",
            PeerHandle::Remote(_) => "Remote",
        };
        write!(f, "{}(id: {}, {}:{})", kind, info.id, info.ip, info.port)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A peer reached over gRPC. Carries the owning process's node (when there is
/// one) so descriptors coming back from remote calls that actually name this
/// process collapse to the `Local` variant instead of looping back over the
/// network.
#[derive(Clone)]
pub struct RemoteNode {
    pub info: NodeRef,
    home: Option<Node>,
}

impl RemoteNode {
    pub fn new(info: NodeRef, home: Option<Node>) -> Self {
        Self { info, home }
    }

    fn ensure_local(&self, info: NodeRef) -> PeerHandle {
        match &self.home {
            Some(node) => node.handle_for(&info),
            None => PeerHandle::Remote(RemoteNode::new(info, None)),
        }
    }

    async fn connect(&self) -> Result<RingClient<Channel>, Status> {
        let endpoint = Endpoint::from_shared(format!("http://{}:{}", self.info.ip, self.info.port))
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS));
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;
        Ok(RingClient::new(channel))
    }

    fn note_failure(&self, op: &str, status: &Status) {
        if status.code() == Code::NotFound {
            debug!("peer {}: {} returned no result", self.info.id, op);
        } else {
            warn!("peer {}: {} failed: {}", self.info.id, op, status);
        }
    }

    pub async fn successor(&self) -> Option<PeerHandle> {
        match self.get_successor_rpc().await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("get_successor", &status);
                None
            }
        }
    }

    pub async fn set_successor(&self, target: NodeRef) {
        if let Err(status) = self.set_successor_rpc(target).await {
            self.note_failure("set_successor", &status);
        }
    }

    pub async fn predecessor(&self) -> Option<PeerHandle> {
        match self.get_predecessor_rpc().await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("get_predecessor", &status);
                None
            }
        }
    }

    pub async fn set_predecessor(&self, target: NodeRef) {
        if let Err(status) = self.set_predecessor_rpc(target).await {
            self.note_failure("set_predecessor", &status);
        }
    }

    pub async fn closest_preceding_finger(&self, id: u64) -> Option<PeerHandle> {
        match self.closest_preceding_finger_rpc(id).await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("closest_preceding_finger", &status);
                None
            }
        }
    }

    pub async fn find_successor(&self, id: u64) -> Option<PeerHandle> {
        match self.find_successor_rpc(id).await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("find_successor", &status);
                None
            }
        }
    }

    pub async fn notify(&self, candidate: NodeRef) {
        if let Err(status) = self.notify_rpc(candidate).await {
            self.note_failure("notify", &status);
        }
    }

    pub async fn heart(&self) -> bool {
        match self.heart_rpc().await {
            Ok(reply) => reply.token == HEART_RESPONSE,
            Err(_) => false,
        }
    }

    pub async fn network_capacity(&self) -> Option<u32> {
        match self.network_capacity_rpc().await {
            Ok(reply) => Some(reply.capacity),
            Err(status) => {
                self.note_failure("network_capacity", &status);
                None
            }
        }
    }

    pub async fn get_users(&self, database_id: Option<u64>) -> Vec<UserEntry> {
        match self.get_users_rpc(database_id).await {
            Ok(list) => list.users,
            Err(status) => {
                self.note_failure("get_users", &status);
                Vec::new()
            }
        }
    }

    pub async fn add_user(&self, user: UserEntry, database_id: Option<u64>) -> bool {
        match self.add_user_rpc(user, database_id).await {
            Ok(ack) => ack.success,
            Err(status) => {
                self.note_failure("add_user", &status);
                false
            }
        }
    }

    pub async fn get_password(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self.get_password_rpc(nickname, database_id).await {
            Ok(reply) => reply.password,
            Err(status) => {
                self.note_failure("get_password", &status);
                String::new()
            }
        }
    }

    pub async fn update_user(
        &self,
        nickname: &str,
        ip: &str,
        port: &str,
        database_id: Option<u64>,
    ) -> bool {
        match self.update_user_rpc(nickname, ip, port, database_id).await {
            Ok(ack) => ack.success,
            Err(status) => {
                self.note_failure("update_user", &status);
                false
            }
        }
    }

    pub async fn delete_user(&self, nickname: &str, database_id: Option<u64>) -> bool {
        match self.delete_user_rpc(nickname, database_id).await {
            Ok(ack) => ack.success,
            Err(status) => {
                self.note_failure("delete_user", &status);
                false
            }
        }
    }

    pub async fn get_ip_port(&self, nickname: &str, database_id: Option<u64>) -> String {
        match self.get_ip_port_rpc(nickname, database_id).await {
            Ok(reply) => reply.ip_port,
            Err(status) => {
                self.note_failure("get_ip_port", &status);
                String::new()
            }
        }
    }

    pub async fn add_message(
        &self,
        from: &str,
        to: &str,
        value: &str,
        message_id: Option<i64>,
        database_id: Option<u64>,
    ) -> bool {
        match self
            .add_message_rpc(from, to, value, message_id, database_id)
            .await
        {
            Ok(ack) => ack.success,
            Err(status) => {
                self.note_failure("add_message", &status);
                false
            }
        }
    }

    pub async fn messages_to(&self, nickname: &str, database_id: Option<u64>) -> Vec<MessageEntry> {
        match self.messages_to_rpc(nickname, database_id).await {
            Ok(list) => list.messages,
            Err(status) => {
                self.note_failure("messages_to", &status);
                Vec::new()
            }
        }
    }

    pub async fn delete_messages_to(&self, nickname: &str, database_id: Option<u64>) -> bool {
        match self.delete_messages_to_rpc(nickname, database_id).await {
            Ok(ack) => ack.success,
            Err(status) => {
                self.note_failure("delete_messages_to", &status);
                false
            }
        }
    }

    pub async fn nickname_identity_node(
        &self,
        nickname: &str,
        search_id: Option<u64>,
    ) -> Option<PeerHandle> {
        match self.nickname_identity_node_rpc(nickname, search_id).await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("nickname_identity_node", &status);
                None
            }
        }
    }

    pub async fn search_identity_node(&self, nickname: &str) -> Option<PeerHandle> {
        match self.search_identity_node_rpc(nickname).await {
            Ok(info) => Some(self.ensure_local(info)),
            Err(status) => {
                self.note_failure("search_identity_node", &status);
                None
            }
        }
    }

    pub async fn get_replication_data(&self) -> Option<ReplicationData> {
        match self.get_replication_data_rpc().await {
            Ok(data) => Some(data),
            Err(status) => {
                self.note_failure("get_replication_data", &status);
                None
            }
        }
    }

    pub async fn replicate(&self, data: ReplicationData, database_id: Option<u64>) {
        if let Err(status) = self.replicate_rpc(data, database_id).await {
            self.note_failure("replicate", &status);
        }
    }

    pub async fn all_nodes(&self, search_id: Option<u64>) -> Vec<NodeRef> {
        match self.all_nodes_rpc(search_id).await {
            Ok(list) => list.nodes,
            Err(status) => {
                self.note_failure("all_nodes", &status);
                Vec::new()
            }
        }
    }

    // RPC helpers

    async fn get_successor_rpc(&self) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client.get_successor(Request::new(Empty {})).await?;
        Ok(response.into_inner())
    }

    async fn set_successor_rpc(&self, target: NodeRef) -> Result<(), Status> {
        let mut client = self.connect().await?;
        client.set_successor(Request::new(target)).await?;
        Ok(())
    }

    async fn get_predecessor_rpc(&self) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client.get_predecessor(Request::new(Empty {})).await?;
        Ok(response.into_inner())
    }

    async fn set_predecessor_rpc(&self, target: NodeRef) -> Result<(), Status> {
        let mut client = self.connect().await?;
        client.set_predecessor(Request::new(target)).await?;
        Ok(())
    }

    async fn closest_preceding_finger_rpc(&self, id: u64) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client
            .closest_preceding_finger(Request::new(IdRequest { id }))
            .await?;
        Ok(response.into_inner())
    }

    async fn find_successor_rpc(&self, id: u64) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client.find_successor(Request::new(IdRequest { id })).await?;
        Ok(response.into_inner())
    }

    async fn notify_rpc(&self, candidate: NodeRef) -> Result<(), Status> {
        let mut client = self.connect().await?;
        client.notify(Request::new(candidate)).await?;
        Ok(())
    }

    async fn heart_rpc(&self) -> Result<ring_proto::ring::HeartReply, Status> {
        let mut client = self.connect().await?;
        let response = client.heart(Request::new(Empty {})).await?;
        Ok(response.into_inner())
    }

    async fn network_capacity_rpc(&self) -> Result<ring_proto::ring::CapacityReply, Status> {
        let mut client = self.connect().await?;
        let response = client.network_capacity(Request::new(Empty {})).await?;
        Ok(response.into_inner())
    }

    async fn get_users_rpc(
        &self,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::UserList, Status> {
        let mut client = self.connect().await?;
        let response = client
            .get_users(Request::new(StoreQuery {
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn add_user_rpc(
        &self,
        user: UserEntry,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::Ack, Status> {
        let mut client = self.connect().await?;
        let response = client
            .add_user(Request::new(AddUserRequest {
                user: Some(user),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn get_password_rpc(
        &self,
        nickname: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::PasswordReply, Status> {
        let mut client = self.connect().await?;
        let response = client
            .get_password(Request::new(UserQuery {
                nickname: nickname.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn update_user_rpc(
        &self,
        nickname: &str,
        ip: &str,
        port: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::Ack, Status> {
        let mut client = self.connect().await?;
        let response = client
            .update_user(Request::new(UpdateUserRequest {
                nickname: nickname.to_string(),
                ip: ip.to_string(),
                port: port.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn delete_user_rpc(
        &self,
        nickname: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::Ack, Status> {
        let mut client = self.connect().await?;
        let response = client
            .delete_user(Request::new(UserQuery {
                nickname: nickname.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn get_ip_port_rpc(
        &self,
        nickname: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::IpPortReply, Status> {
        let mut client = self.connect().await?;
        let response = client
            .get_ip_port(Request::new(UserQuery {
                nickname: nickname.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn add_message_rpc(
        &self,
        from: &str,
        to: &str,
        value: &str,
        message_id: Option<i64>,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::Ack, Status> {
        let mut client = self.connect().await?;
        let response = client
            .add_message(Request::new(AddMessageRequest {
                from_nickname: from.to_string(),
                to_nickname: to.to_string(),
                value: value.to_string(),
                message_id: to_wire_message_id(message_id),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn messages_to_rpc(
        &self,
        nickname: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::MessageList, Status> {
        let mut client = self.connect().await?;
        let response = client
            .messages_to(Request::new(UserQuery {
                nickname: nickname.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn delete_messages_to_rpc(
        &self,
        nickname: &str,
        database_id: Option<u64>,
    ) -> Result<ring_proto::ring::Ack, Status> {
        let mut client = self.connect().await?;
        let response = client
            .delete_messages_to(Request::new(UserQuery {
                nickname: nickname.to_string(),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn nickname_identity_node_rpc(
        &self,
        nickname: &str,
        search_id: Option<u64>,
    ) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client
            .nickname_identity_node(Request::new(NicknameQuery {
                nickname: nickname.to_string(),
                search_id: to_wire_id(search_id),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn search_identity_node_rpc(&self, nickname: &str) -> Result<NodeRef, Status> {
        let mut client = self.connect().await?;
        let response = client
            .search_identity_node(Request::new(NicknameRequest {
                nickname: nickname.to_string(),
            }))
            .await?;
        Ok(response.into_inner())
    }

    async fn get_replication_data_rpc(&self) -> Result<ReplicationData, Status> {
        let mut client = self.connect().await?;
        let response = client.get_replication_data(Request::new(Empty {})).await?;
        Ok(response.into_inner())
    }

    async fn replicate_rpc(
        &self,
        data: ReplicationData,
        database_id: Option<u64>,
    ) -> Result<(), Status> {
        let mut client = self.connect().await?;
        client
            .replicate(Request::new(ReplicateRequest {
                data: Some(data),
                database_id: to_wire_id(database_id),
            }))
            .await?;
        Ok(())
    }

    async fn all_nodes_rpc(
        &self,
        search_id: Option<u64>,
    ) -> Result<ring_proto::ring::NodeList, Status> {
        let mut client = self.connect().await?;
        let response = client
            .all_nodes(Request::new(WalkQuery {
                search_id: to_wire_id(search_id),
            }))
            .await?;
        Ok(response.into_inner())
    }
}
