use crate::core::Address;
use crate::network::mock::hub::NetworkHub;
use crate::network::{Message, MessageProcessor, Network};
use anyhow::Context;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// MockNetwork is a mock implementation of the Network trait for testing purposes.
/// It does not perform any real network operations but simulates message routing and processing through a `NetworkHub`.
pub struct MockNetwork {
    hub: Arc<NetworkHub>,
    address: Address,
    processor: Arc<Mutex<Option<MessageProcessor>>>,
}

impl MockNetwork {
    /// Creates a new instance of MockNetwork with the given NetworkHub.
    pub fn new(hub: Arc<NetworkHub>, address: Address) -> Self {
        MockNetwork {
            hub,
            address,
            processor: Arc::new(Mutex::new(None)),
        }
    }

    /// This is the event handler for processing incoming messages come through the mock network.
    /// Returns the reply of the registered processor, or an error if no processor is registered
    /// or processing failed.
    pub fn incoming_message(&self, message: Message) -> anyhow::Result<Message> {
        // clone the handle out so the slot is not locked while the request is processed
        let processor = self
            .processor
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire lock on processor container"))?
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No message processor registered"))?;

        processor
            .process_incoming_message(message)
            .context("Failed to process incoming message")
    }
}

impl Clone for MockNetwork {
    fn clone(&self) -> Self {
        MockNetwork {
            hub: Arc::clone(&self.hub),
            address: self.address,
            processor: Arc::clone(&self.processor),
        }
    }
}

impl Network for MockNetwork {
    /// Sends a message through the mock network by routing it through the NetworkHub.
    /// Delivery is synchronous, so the timeout is not needed.
    fn send_message(
        &self,
        target: &Address,
        message: Message,
        _timeout: Duration,
    ) -> anyhow::Result<Message> {
        self.hub
            .route_message(target, message)
            .context("Failed to route message")
    }

    fn register_processor(&self, processor: MessageProcessor) -> anyhow::Result<()> {
        let mut processor_guard = self
            .processor
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire lock on processor container"))?;

        match processor_guard.as_ref() {
            Some(_) => Err(anyhow::anyhow!("A message processor is already registered")),
            None => {
                *processor_guard = Some(processor);
                Ok(())
            }
        }
    }

    fn local_address(&self) -> Address {
        self.address
    }

    fn clone_box(&self) -> Box<dyn Network> {
        Box::new(self.clone())
    }
}
