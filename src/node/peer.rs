use crate::core::{Address, Identifier, Identity};
use crate::error::ChordError;
use crate::network::{Message, Network, Payload};
use std::time::{Duration, Instant};
use tracing::{Level, Span};

/// Shortest wait worth spending on an attempt that is bounded by a deadline.
pub(crate) const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(10);

/// RemotePeer is a handle on another ring member. Every operation is a single request/reply
/// exchange bounded by a timeout; a call that still fails after the configured retries reports
/// the peer as unreachable.
pub struct RemotePeer {
    target: Address,
    sender: Address,
    net: Box<dyn Network>,
    timeout: Duration,
    retries: u32,
    span: Span,
}

impl RemotePeer {
    pub fn new(
        parent_span: &Span,
        net: Box<dyn Network>,
        target: Address,
        timeout: Duration,
        retries: u32,
    ) -> RemotePeer {
        let span = tracing::span!(parent: parent_span, Level::TRACE, "remote_peer", peer = %target);
        RemotePeer {
            target,
            sender: net.local_address(),
            net,
            timeout,
            retries,
            span,
        }
    }

    pub fn address(&self) -> Address {
        self.target
    }

    pub fn ping(&self) -> Result<(), ChordError> {
        match self.call(Payload::Ping)? {
            Payload::Pong => Ok(()),
            other => Err(self.unexpected("pong", other)),
        }
    }

    /// Asks the peer to resolve the successor of `id`; `hops` is the number of forwards so far.
    ///
    /// Attempts are cut short so that none outlives `deadline`, and each request tells the peer
    /// how long this side will wait for it, so the peer can give up on its own next hop in time
    /// to answer.
    pub fn resolve_successor(
        &self,
        id: Identifier,
        hops: u32,
        deadline: Instant,
    ) -> Result<Identity, ChordError> {
        let request = |timeout: Duration| Payload::ResolveSuccessor {
            id,
            hops,
            budget_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        match self.exchange(request, Some(deadline))? {
            Payload::ResolveSuccessorReply(identity) => Ok(identity),
            other => Err(self.unexpected("resolve_successor_reply", other)),
        }
    }

    pub fn successor_list(&self) -> Result<Vec<Identity>, ChordError> {
        match self.call(Payload::GetSuccessorList)? {
            Payload::SuccessorListReply(list) => Ok(list),
            other => Err(self.unexpected("successor_list_reply", other)),
        }
    }

    pub fn predecessor(&self) -> Result<Option<Identity>, ChordError> {
        match self.call(Payload::GetPredecessor)? {
            Payload::PredecessorReply(predecessor) => Ok(predecessor),
            other => Err(self.unexpected("predecessor_reply", other)),
        }
    }

    /// Tells the peer that `candidate` might be its predecessor.
    pub fn notify(&self, candidate: Identity) -> Result<(), ChordError> {
        match self.call(Payload::Notify(candidate))? {
            Payload::Ack => Ok(()),
            other => Err(self.unexpected("ack", other)),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ChordError> {
        match self.call(Payload::Get(key.to_string()))? {
            Payload::GetReply(value) => Ok(value),
            other => Err(self.unexpected("get_reply", other)),
        }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), ChordError> {
        let payload = Payload::Put {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.call(payload)? {
            Payload::PutReply => Ok(()),
            other => Err(self.unexpected("put_reply", other)),
        }
    }

    /// Sends one request, retrying transport failures. A `Failure` reply is returned as the
    /// error it carries; protocol errors found in the transport error chain are not retried.
    fn call(&self, payload: Payload) -> Result<Payload, ChordError> {
        self.exchange(|_| payload.clone(), None)
    }

    /// Like `call`, but the request is rebuilt for every attempt from the timeout that attempt
    /// gets. With a deadline, each attempt waits at most until the deadline, and no retry is
    /// started once less than `MIN_ATTEMPT_TIMEOUT` remains.
    fn exchange<F>(&self, request: F, deadline: Option<Instant>) -> Result<Payload, ChordError>
    where
        F: Fn(Duration) -> Payload,
    {
        let _enter = self.span.enter();
        let mut last_error = None;
        let mut attempts: u32 = 0;

        for attempt in 0..=self.retries {
            let timeout = match deadline {
                None => self.timeout,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if attempt > 0 && remaining < MIN_ATTEMPT_TIMEOUT {
                        tracing::trace!("deadline reached after {} attempts", attempts);
                        break;
                    }
                    self.timeout.min(remaining).max(MIN_ATTEMPT_TIMEOUT)
                }
            };

            let payload = request(timeout);
            let kind = payload.kind();
            attempts += 1;
            tracing::trace!("sending {} (attempt {}, timeout {:?})", kind, attempts, timeout);
            let message = Message::new(payload, self.sender);
            match self.net.send_message(&self.target, message, timeout) {
                Ok(reply) => {
                    return match reply.payload {
                        Payload::Failure(err) => {
                            tracing::debug!("{} failed remotely: {}", kind, err);
                            Err(err)
                        }
                        other => Ok(other),
                    };
                }
                Err(err) => {
                    if let Some(chord_err) = ChordError::classify(&err) {
                        return Err(chord_err);
                    }
                    tracing::trace!("{} attempt {} failed: {:#}", kind, attempts, err);
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|err| format!("{:#}", err))
            .unwrap_or_else(|| "no attempt was made".to_string());
        tracing::debug!("giving up on {} after {} attempts", self.target, attempts);
        Err(ChordError::unreachable(self.target, reason))
    }

    fn unexpected(&self, expected: &str, got: Payload) -> ChordError {
        ChordError::MalformedMessage(format!(
            "expected {} from {}, got {}",
            expected,
            self.target,
            got.kind()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::fixtures::{identity_at, span_fixture};
    use crate::network::mock::NetworkHub;
    use crate::network::{MessageProcessor, MessageProcessorCore};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replies with a fixed payload, or fails the first `failures` deliveries.
    struct ScriptedCore {
        address: Address,
        reply: Payload,
        failures: AtomicUsize,
        calls: AtomicUsize,
        requests: Mutex<Vec<Payload>>,
    }

    impl MessageProcessorCore for ScriptedCore {
        fn process_incoming_message(&self, message: Message) -> anyhow::Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(message.payload);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow::anyhow!("dropped"));
            }
            Ok(Message::new(self.reply.clone(), self.address))
        }
    }

    fn scripted(reply: Payload, failures: usize) -> (RemotePeer, Arc<ScriptedCore>) {
        let hub = NetworkHub::new();
        let caller = NetworkHub::new_mock_network(&hub, identity_at(1).address()).unwrap();
        let target = identity_at(2).address();
        let callee = NetworkHub::new_mock_network(&hub, target).unwrap();
        let core = Arc::new(ScriptedCore {
            address: target,
            reply,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });
        callee
            .register_processor(MessageProcessor::new(core.clone()))
            .unwrap();
        let peer = RemotePeer::new(
            &span_fixture(),
            Box::new(caller),
            target,
            Duration::from_millis(100),
            1,
        );
        (peer, core)
    }

    #[test]
    fn test_typed_reply() {
        let (peer, _) = scripted(Payload::ResolveSuccessorReply(identity_at(40)), 0);
        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(
            peer.resolve_successor(Identifier::new(33), 0, deadline),
            Ok(identity_at(40))
        );
    }

    #[test]
    fn test_retry_then_success() {
        let (peer, core) = scripted(Payload::Pong, 1);
        assert_eq!(peer.ping(), Ok(()));
        assert_eq!(core.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retries_exhausted_is_unreachable() {
        let (peer, core) = scripted(Payload::Pong, 5);
        match peer.ping() {
            Err(ChordError::PeerUnreachable { address, .. }) => assert_eq!(address, peer.address()),
            other => panic!("expected unreachable peer, got {:?}", other),
        }
        assert_eq!(core.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_reply_is_returned_as_error() {
        let err = ChordError::LookupExceededHops {
            target: Identifier::new(5),
            hops: 15,
        };
        let (peer, core) = scripted(Payload::Failure(err.clone()), 0);
        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(peer.resolve_successor(Identifier::new(5), 3, deadline), Err(err));
        assert_eq!(core.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mismatched_reply_is_malformed() {
        let (peer, _) = scripted(Payload::Ack, 0);
        assert!(matches!(peer.get("apple"), Err(ChordError::MalformedMessage(_))));
    }

    /// The request tells the peer how long the caller waits, which never exceeds the deadline.
    #[test]
    fn test_resolve_successor_carries_remaining_budget() {
        let (peer, core) = scripted(Payload::ResolveSuccessorReply(identity_at(40)), 0);
        let deadline = Instant::now() + Duration::from_millis(50);
        peer.resolve_successor(Identifier::new(33), 2, deadline).unwrap();

        match core.requests.lock().as_slice() {
            [Payload::ResolveSuccessor { id, hops, budget_ms }] => {
                assert_eq!(*id, Identifier::new(33));
                assert_eq!(*hops, 2);
                assert!(*budget_ms <= 50, "budget {} exceeds the deadline", budget_ms);
                assert!(*budget_ms >= MIN_ATTEMPT_TIMEOUT.as_millis() as u64);
            }
            other => panic!("expected one resolve_successor request, got {:?}", other),
        };
    }

    /// An expired deadline still allows the first attempt but no retry.
    #[test]
    fn test_expired_deadline_skips_retry() {
        let (peer, core) = scripted(Payload::Pong, 5);
        let result = peer.resolve_successor(Identifier::new(33), 0, Instant::now());
        assert!(matches!(result, Err(ChordError::PeerUnreachable { .. })));
        assert_eq!(core.calls.load(Ordering::SeqCst), 1);
    }
}
