use crate::network::{Message, MessageProcessorCore};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A shareable handle on the message processor of a node.
/// The core is not wrapped in a lock: a node may receive a request while one of its own handlers
/// is blocked on a remote call, so cores synchronize their own state.
#[derive(Clone)]
pub struct MessageProcessor {
    core: Arc<dyn MessageProcessorCore>,
}

impl MessageProcessor {
    pub fn new(core: Arc<dyn MessageProcessorCore>) -> Self {
        Self { core }
    }

    /// Hands an incoming request to the core and returns its reply.
    pub fn process_incoming_message(&self, message: Message) -> anyhow::Result<Message> {
        self.core.process_incoming_message(message)
    }
}

impl Debug for MessageProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageProcessor")
    }
}
