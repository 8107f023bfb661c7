use crate::core::Address;
use crate::network::mock::network::MockNetwork;
use crate::network::Message;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// NetworkHub is a central hub that manages multiple mock networks.
/// It allows for the creation of new mock networks and routing messages between them.
/// Messages are routed completely through the hub in an in-memory fashion, simulating a network environment without actual network communication.
pub struct NetworkHub {
    networks: RwLock<HashMap<Address, MockNetwork>>,
    deliveries: Mutex<HashMap<(Address, &'static str), usize>>,
}

impl NetworkHub {
    pub fn new() -> Arc<Self> {
        Arc::new(NetworkHub {
            networks: RwLock::new(HashMap::new()),
            deliveries: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a new mock network reachable at the given address and registers it in the hub.
    pub fn new_mock_network(hub: &Arc<Self>, address: Address) -> anyhow::Result<MockNetwork> {
        let mut inner_networks = hub
            .networks
            .write()
            .map_err(|_| anyhow!("Failed to acquire write lock on network hub"))?;
        if inner_networks.contains_key(&address) {
            return Err(anyhow!("Network with address {} already exists", address));
        }
        let mock_network = MockNetwork::new(Arc::clone(hub), address);
        inner_networks.insert(address, mock_network.clone());
        Ok(mock_network)
    }

    /// Routes a request to the mock network registered at `target` and returns its reply.
    /// The hub lock is released before the target processes the message, so the target may
    /// itself send messages through the hub while handling it.
    pub fn route_message(&self, target: &Address, message: Message) -> anyhow::Result<Message> {
        let network = {
            let inner_networks = self
                .networks
                .read()
                .map_err(|_| anyhow!("Failed to acquire read lock on network hub"))?;
            inner_networks
                .get(target)
                .cloned()
                .ok_or_else(|| anyhow!("Network with address {} not found", target))?
        };

        self.record_delivery(target, message.payload.kind())?;
        network
            .incoming_message(message)
            .with_context(|| format!("Failed to deliver message to {}", target))
    }

    /// Removes the network at `address` from the hub; later messages to it fail as if the node
    /// had crashed. Returns false if no such network was registered.
    pub fn disconnect(&self, address: &Address) -> anyhow::Result<bool> {
        let mut inner_networks = self
            .networks
            .write()
            .map_err(|_| anyhow!("Failed to acquire write lock on network hub"))?;
        Ok(inner_networks.remove(address).is_some())
    }

    /// Number of messages of the given kind delivered to `address` so far.
    pub fn deliveries(&self, address: &Address, kind: &'static str) -> usize {
        self.deliveries
            .lock()
            .map(|counts| counts.get(&(*address, kind)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Resets every delivery counter.
    pub fn reset_deliveries(&self) -> anyhow::Result<()> {
        self.deliveries
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on delivery counters"))?
            .clear();
        Ok(())
    }

    fn record_delivery(&self, address: &Address, kind: &'static str) -> anyhow::Result<()> {
        let mut counts = self
            .deliveries
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on delivery counters"))?;
        *counts.entry((*address, kind)).or_insert(0) += 1;
        Ok(())
    }
}
