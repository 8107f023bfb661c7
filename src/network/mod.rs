pub mod codec;
pub mod mock;
mod processor;
pub mod tcp;

use crate::core::model::identity::Identity;
use crate::core::{Address, Identifier};
use crate::error::ChordError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use processor::MessageProcessor;

/// Payload is the closed set of messages exchanged between ring members. Every request has exactly
/// one reply variant; `Failure` may answer any request whose operation failed on the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Payload {
    Ping,
    Pong,
    /// `hops` counts the forwards so far; `budget_ms` is how long the sender waits for the reply.
    ResolveSuccessor {
        id: Identifier,
        hops: u32,
        budget_ms: u64,
    },
    ResolveSuccessorReply(Identity),
    GetSuccessorList,
    SuccessorListReply(Vec<Identity>),
    GetPredecessor,
    PredecessorReply(Option<Identity>),
    Notify(Identity),
    Ack,
    Get(String),
    GetReply(Option<String>),
    Put { key: String, value: String },
    PutReply,
    Failure(ChordError),
}

impl Payload {
    /// Short name of the variant, used for logging and delivery accounting.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Ping => "ping",
            Payload::Pong => "pong",
            Payload::ResolveSuccessor { .. } => "resolve_successor",
            Payload::ResolveSuccessorReply(_) => "resolve_successor_reply",
            Payload::GetSuccessorList => "get_successor_list",
            Payload::SuccessorListReply(_) => "successor_list_reply",
            Payload::GetPredecessor => "get_predecessor",
            Payload::PredecessorReply(_) => "predecessor_reply",
            Payload::Notify(_) => "notify",
            Payload::Ack => "ack",
            Payload::Get(_) => "get",
            Payload::GetReply(_) => "get_reply",
            Payload::Put { .. } => "put",
            Payload::PutReply => "put_reply",
            Payload::Failure(_) => "failure",
        }
    }
}

/// Message is the envelope carried over the network: a payload and the address of its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: Payload,
    pub sender: Address,
}

impl Message {
    pub fn new(payload: Payload, sender: Address) -> Message {
        Message { payload, sender }
    }
}

/// MessageProcessorCore is the entity that answers incoming requests at this node.
/// Implementations must be internally synchronized; the network may deliver several requests
/// concurrently, including requests that arrive while the processor is itself waiting on a
/// remote call.
pub trait MessageProcessorCore: Send + Sync {
    fn process_incoming_message(&self, message: Message) -> anyhow::Result<Message>;
}

/// Network trait defines the request/reply channel between ring members.
#[cfg_attr(test, unimock::unimock(api = NetworkMock))]
pub trait Network: Send + Sync {
    /// Sends a request to `target` and blocks until its reply arrives or `timeout` elapses.
    fn send_message(
        &self,
        target: &Address,
        message: Message,
        timeout: Duration,
    ) -> anyhow::Result<Message>;

    /// Registers a message processor to handle incoming messages.
    /// At any point in time, there can be only one processor registered.
    /// Registering a new processor is illegal if there is already a processor registered, and causes an error.
    fn register_processor(&self, processor: MessageProcessor) -> anyhow::Result<()>;

    /// The address other members use to reach this network.
    fn local_address(&self) -> Address;

    fn clone_box(&self) -> Box<dyn Network>;
}

impl Clone for Box<dyn Network> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
