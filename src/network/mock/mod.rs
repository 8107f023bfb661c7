pub mod hub;
pub mod network;

pub use hub::NetworkHub;
pub use network::MockNetwork;
