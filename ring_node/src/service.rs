//! gRPC boundary: maps the `Ring` wire contract onto the node. Sentinel ids
//! (`-1`) become `Option`s here; "nothing there" answers (no predecessor yet,
//! lookup miss) are `NOT_FOUND`, which remote peers read as an absent result,
//! not a dead node.

use ring_proto::ring::ring_server::Ring;
use ring_proto::ring::{
    Ack, AddMessageRequest, AddUserRequest, CapacityReply, Empty, HeartReply, IdRequest,
    IpPortReply, MessageList, NicknameQuery, NicknameRequest, NodeList, NodeRef, PasswordReply,
    ReplicateRequest, ReplicationData, StoreQuery, UpdateUserRequest, UserList, UserQuery,
    WalkQuery,
};
use tonic::{Request, Response, Status};

use crate::node::Node;
use crate::peer::{from_wire_id, from_wire_message_id};

#[tonic::async_trait]
impl Ring for Node {
    async fn get_successor(&self, _request: Request<Empty>) -> Result<Response<NodeRef>, Status> {
        match self.successor().await {
            Some(peer) => Ok(Response::new(peer.node_ref())),
            None => Err(Status::not_found("no successor")),
        }
    }

    async fn set_successor(&self, request: Request<NodeRef>) -> Result<Response<Empty>, Status> {
        let handle = self.handle_for(&request.into_inner());
        self.set_successor(handle).await;
        Ok(Response::new(Empty {}))
    }

    async fn get_predecessor(&self, _request: Request<Empty>) -> Result<Response<NodeRef>, Status> {
        match self.predecessor().await {
            Some(peer) => Ok(Response::new(peer.node_ref())),
            None => Err(Status::not_found("no predecessor")),
        }
    }

    async fn set_predecessor(&self, request: Request<NodeRef>) -> Result<Response<Empty>, Status> {
        let handle = self.handle_for(&request.into_inner());
        self.set_predecessor(handle).await;
        Ok(Response::new(Empty {}))
    }

    async fn closest_preceding_finger(
        &self,
        request: Request<IdRequest>,
    ) -> Result<Response<NodeRef>, Status> {
        let peer = self.closest_preceding_finger(request.into_inner().id).await;
        Ok(Response::new(peer.node_ref()))
    }

    async fn find_successor(
        &self,
        request: Request<IdRequest>,
    ) -> Result<Response<NodeRef>, Status> {
        let id = request.into_inner().id;
        match self.find_successor(id).await {
            Some(peer) => Ok(Response::new(peer.node_ref())),
            None => Err(Status::not_found(format!("no successor found for id {id}"))),
        }
    }

    async fn notify(&self, request: Request<NodeRef>) -> Result<Response<Empty>, Status> {
        let candidate = self.handle_for(&request.into_inner());
        self.notify(candidate).await;
        Ok(Response::new(Empty {}))
    }

    async fn heart(&self, _request: Request<Empty>) -> Result<Response<HeartReply>, Status> {
        Ok(Response::new(HeartReply {
            token: self.heart().to_string(),
        }))
    }

    async fn network_capacity(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<CapacityReply>, Status> {
        Ok(Response::new(CapacityReply {
            capacity: self.network_capacity(),
        }))
    }

    async fn get_users(&self, request: Request<StoreQuery>) -> Result<Response<UserList>, Status> {
        let database_id = from_wire_id(request.into_inner().database_id);
        Ok(Response::new(UserList {
            users: self.get_users(database_id).await,
        }))
    }

    async fn add_user(&self, request: Request<AddUserRequest>) -> Result<Response<Ack>, Status> {
        let request = request.into_inner();
        let Some(user) = request.user else {
            return Err(Status::invalid_argument("missing user record"));
        };
        let success = self
            .add_user(user, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(Ack { success }))
    }

    async fn get_password(
        &self,
        request: Request<UserQuery>,
    ) -> Result<Response<PasswordReply>, Status> {
        let request = request.into_inner();
        let password = self
            .get_password(&request.nickname, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(PasswordReply { password }))
    }

    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<Ack>, Status> {
        let request = request.into_inner();
        let success = self
            .update_user(
                &request.nickname,
                &request.ip,
                &request.port,
                from_wire_id(request.database_id),
            )
            .await;
        Ok(Response::new(Ack { success }))
    }

    async fn delete_user(&self, request: Request<UserQuery>) -> Result<Response<Ack>, Status> {
        let request = request.into_inner();
        let success = self
            .delete_user(&request.nickname, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(Ack { success }))
    }

    async fn get_ip_port(
        &self,
        request: Request<UserQuery>,
    ) -> Result<Response<IpPortReply>, Status> {
        let request = request.into_inner();
        let ip_port = self
            .get_ip_port(&request.nickname, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(IpPortReply { ip_port }))
    }

    async fn add_message(
        &self,
        request: Request<AddMessageRequest>,
    ) -> Result<Response<Ack>, Status> {
        let request = request.into_inner();
        let success = self
            .add_message(
                &request.from_nickname,
                &request.to_nickname,
                &request.value,
                from_wire_message_id(request.message_id),
                from_wire_id(request.database_id),
            )
            .await;
        Ok(Response::new(Ack { success }))
    }

    async fn messages_to(
        &self,
        request: Request<UserQuery>,
    ) -> Result<Response<MessageList>, Status> {
        let request = request.into_inner();
        let messages = self
            .messages_to(&request.nickname, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(MessageList { messages }))
    }

    async fn delete_messages_to(
        &self,
        request: Request<UserQuery>,
    ) -> Result<Response<Ack>, Status> {
        let request = request.into_inner();
        let success = self
            .delete_messages_to(&request.nickname, from_wire_id(request.database_id))
            .await;
        Ok(Response::new(Ack { success }))
    }

    async fn nickname_identity_node(
        &self,
        request: Request<NicknameQuery>,
    ) -> Result<Response<NodeRef>, Status> {
        let request = request.into_inner();
        let found = self
            .nickname_identity_node(&request.nickname, from_wire_id(request.search_id))
            .await;
        match found {
            Some(peer) => Ok(Response::new(peer.node_ref())),
            None => Err(Status::not_found(format!(
                "nickname {} is not registered",
                request.nickname
            ))),
        }
    }

    async fn search_identity_node(
        &self,
        request: Request<NicknameRequest>,
    ) -> Result<Response<NodeRef>, Status> {
        let nickname = request.into_inner().nickname;
        match self.search_identity_node(&nickname).await {
            Some(peer) => Ok(Response::new(peer.node_ref())),
            None => Err(Status::not_found(format!(
                "no node responsible for {nickname}"
            ))),
        }
    }

    async fn get_replication_data(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ReplicationData>, Status> {
        Ok(Response::new(self.get_replication_data().await))
    }

    async fn replicate(
        &self,
        request: Request<ReplicateRequest>,
    ) -> Result<Response<Empty>, Status> {
        let request = request.into_inner();
        let Some(data) = request.data else {
            return Err(Status::invalid_argument("missing replication payload"));
        };
        self.replicate(data, from_wire_id(request.database_id)).await;
        Ok(Response::new(Empty {}))
    }

    async fn all_nodes(&self, request: Request<WalkQuery>) -> Result<Response<NodeList>, Status> {
        let search_id = from_wire_id(request.into_inner().search_id);
        Ok(Response::new(NodeList {
            nodes: self.all_nodes(search_id).await,
        }))
    }
}
