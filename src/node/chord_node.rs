use crate::core::{
    Address, ArrayFingerTable, DataStore, FingerTable, Identifier, Identity, Ring, SuccessorList,
};
use crate::error::ChordError;
use crate::network::{Message, MessageProcessor, MessageProcessorCore, Network, Payload};
use crate::node::lookup::forwarded_deadline;
use crate::node::peer::RemotePeer;
use crate::node::{Node, NodeOptions, NodeSnapshot};
use anyhow::anyhow;
use parking_lot::RwLock;
use std::fmt;
use std::fmt::Formatter;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Span;

/// ChordNode is the local member of a Chord ring: its identity, its view of the neighbors, and
/// the keys it owns. Every piece of mutable state sits behind its own lock, and no lock is held
/// while a remote call is in flight.
///
/// Cloning is shallow: clones share the same state, so a clone can be handed to background tasks
/// or registered as the network's message processor.
pub struct ChordNode {
    pub(super) identity: Identity,
    pub(super) ring: Ring,
    pub(super) options: NodeOptions,
    pub(super) predecessor: Arc<RwLock<Option<Identity>>>,
    pub(super) successors: SuccessorList,
    pub(super) fingers: Box<dyn FingerTable>,
    pub(super) store: DataStore,
    pub(super) net: Box<dyn Network>,
    pub(super) next_finger: Arc<AtomicUsize>,
    pub(super) span: Span,
}

impl ChordNode {
    /// Creates a node that is not yet part of any ring and registers it as the message processor
    /// of `net`. Call `join` to seed a new ring or to enter an existing one.
    pub fn new(
        parent_span: &Span,
        identity: Identity,
        ring: Ring,
        options: NodeOptions,
        net: Box<dyn Network>,
    ) -> anyhow::Result<Self> {
        if options.successor_list_len == 0 {
            return Err(anyhow!("successor list length must be at least 1"));
        }
        if identity.id().value() >= ring.modulus() {
            return Err(anyhow!(
                "identifier {} is outside of the ring [0, {})",
                identity.id(),
                ring.modulus()
            ));
        }

        let span = tracing::span!(
            parent: parent_span,
            tracing::Level::TRACE,
            "chord_node",
            id = %identity.id()
        );
        let _enter = span.enter();

        tracing::trace!("creating ChordNode {} on a ring of {}", identity, ring.modulus());

        let node = ChordNode {
            identity,
            ring,
            options,
            predecessor: Arc::new(RwLock::new(None)),
            successors: SuccessorList::new(&span, identity, options.successor_list_len),
            fingers: Box::new(ArrayFingerTable::new(&span, ring.finger_count())),
            store: DataStore::new(&span),
            net: net.clone(),
            next_finger: Arc::new(AtomicUsize::new(0)),
            span: span.clone(),
        };

        let processor = MessageProcessor::new(Arc::new(node.clone()));
        net.register_processor(processor)
            .map_err(|e| anyhow!("could not register node in network: {}", e))?;

        tracing::trace!("successfully created and registered ChordNode {}", identity);

        Ok(node)
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }

    pub fn options(&self) -> NodeOptions {
        self.options
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn predecessor(&self) -> Option<Identity> {
        *self.predecessor.read()
    }

    /// The immediate successor; the node itself when no successor is known.
    pub fn successor(&self) -> Identity {
        self.successors.first().unwrap_or(self.identity)
    }

    pub fn successor_list(&self) -> Vec<Identity> {
        self.successors.list()
    }

    /// Populated finger entries as `(index, identity)`.
    pub fn fingers(&self) -> Vec<(usize, Identity)> {
        match self.fingers.entries() {
            Ok(entries) => entries,
            Err(e) => {
                let _enter = self.span.enter();
                tracing::warn!("could not read finger table: {}", e);
                Vec::new()
            }
        }
    }

    /// Starts a new ring containing only this node.
    pub fn seed(&self) {
        let _enter = self.span.enter();
        self.successors.seed();
        *self.predecessor.write() = None;
        if let Err(e) = self.fingers.clear() {
            tracing::warn!("could not clear finger table: {}", e);
        }
        tracing::debug!("seeded a new ring at {}", self.identity);
    }

    /// Handle on another member, sharing this node's network, timeout and retry policy.
    pub fn peer(&self, address: Address) -> RemotePeer {
        RemotePeer::new(
            &self.span,
            self.net.clone(),
            address,
            self.options.rpc_timeout,
            self.options.rpc_retries,
        )
    }

    /// Drops every reference to a member that failed to answer.
    pub(super) fn forget(&self, address: &Address) {
        let _enter = self.span.enter();
        let removed = self.successors.remove(address);
        let evicted = self.fingers.evict(address).unwrap_or_else(|e| {
            tracing::warn!("could not evict {} from finger table: {}", address, e);
            0
        });
        let mut predecessor = self.predecessor.write();
        let was_predecessor = predecessor.is_some_and(|p| p.address() == *address);
        if was_predecessor {
            *predecessor = None;
        }
        tracing::debug!(
            "forgot {} (successor: {}, fingers: {}, predecessor: {})",
            address,
            removed,
            evicted,
            was_predecessor
        );
    }

    /// Ring position of a key.
    pub(super) fn key_id(&self, key: &str) -> Identifier {
        self.ring.hash_to_identifier(key)
    }
}

impl Node for ChordNode {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn join(&self, introducer: Option<Identity>) -> Result<(), ChordError> {
        let _enter = self.span.enter();
        let introducer = match introducer {
            Some(introducer) if introducer.address() != self.address() => introducer,
            _ => {
                self.seed();
                return Ok(());
            }
        };

        tracing::debug!("joining ring through {}", introducer);
        let successor = self
            .peer(introducer.address())
            .resolve_successor(self.identity.id(), 0, Instant::now() + self.lookup_budget())
            .map_err(|e| ChordError::JoinError {
                introducer: introducer.address(),
                reason: e.to_string(),
            })?;

        *self.predecessor.write() = None;
        if let Err(e) = self.fingers.clear() {
            tracing::warn!("could not clear finger table: {}", e);
        }
        if successor.address() == self.address() {
            self.successors.seed();
        } else {
            self.successors.reset_to(successor);
            if let Err(e) = self.fingers.update_entry(successor, 0) {
                tracing::warn!("could not record first finger: {}", e);
            }
        }
        tracing::debug!("joined ring with successor {}", successor);
        Ok(())
    }

    fn find_successor(&self, id: Identifier) -> Result<Identity, ChordError> {
        self.resolve_successor(id, 0)
    }

    fn insert(&self, key: &str, value: &str) -> Result<(), ChordError> {
        self.put_key(key, value)
    }

    fn lookup(&self, key: &str) -> Result<Option<String>, ChordError> {
        self.get_key(key)
    }

    fn describe(&self) -> NodeSnapshot {
        NodeSnapshot {
            identity: self.identity,
            predecessor: self.predecessor(),
            successors: self.successor_list(),
            fingers: self.fingers(),
            entries: self.store.entries(),
        }
    }
}

impl MessageProcessorCore for ChordNode {
    fn process_incoming_message(&self, message: Message) -> anyhow::Result<Message> {
        let _enter = self.span.enter();
        tracing::trace!(
            "processing incoming {} from {}",
            message.payload.kind(),
            message.sender
        );

        let reply = match message.payload {
            Payload::Ping => Payload::Pong,
            Payload::ResolveSuccessor { id, hops, budget_ms } => {
                match self.resolve_before(id, hops, forwarded_deadline(budget_ms)) {
                    Ok(identity) => Payload::ResolveSuccessorReply(identity),
                    Err(e) => Payload::Failure(e),
                }
            }
            Payload::GetSuccessorList => Payload::SuccessorListReply(self.successor_list()),
            Payload::GetPredecessor => Payload::PredecessorReply(self.predecessor()),
            Payload::Notify(candidate) => {
                self.notify(candidate);
                Payload::Ack
            }
            Payload::Get(key) => Payload::GetReply(self.store.get(self.key_id(&key), &key)),
            Payload::Put { key, value } => {
                self.store.put(self.key_id(&key), &key, &value);
                Payload::PutReply
            }
            reply @ (Payload::Pong
            | Payload::ResolveSuccessorReply(_)
            | Payload::SuccessorListReply(_)
            | Payload::PredecessorReply(_)
            | Payload::Ack
            | Payload::GetReply(_)
            | Payload::PutReply
            | Payload::Failure(_)) => {
                tracing::warn!(
                    "received reply {} from {} as a request",
                    reply.kind(),
                    message.sender
                );
                return Err(ChordError::MalformedMessage(format!(
                    "{} is a reply, not a request",
                    reply.kind()
                ))
                .into());
            }
        };

        Ok(Message::new(reply, self.address()))
    }
}

/// Nodes are equal when they have the same identity.
impl PartialEq for ChordNode {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl fmt::Debug for ChordNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChordNode")
            .field("identity", &self.identity)
            .field("predecessor", &self.predecessor())
            .field("successors", &self.successors)
            .finish()
    }
}

impl Clone for ChordNode {
    fn clone(&self) -> Self {
        ChordNode {
            identity: self.identity,
            ring: self.ring,
            options: self.options,
            predecessor: Arc::clone(&self.predecessor),
            successors: self.successors.clone(),
            fingers: self.fingers.clone(),
            store: self.store.clone(),
            net: self.net.clone(),
            next_finger: Arc::clone(&self.next_finger),
            span: self.span.clone(),
        }
    }
}
