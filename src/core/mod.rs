pub mod context;
mod lookup;
pub mod model;
mod store;
#[cfg(test)]
pub mod testutil;

pub use crate::core::context::IrrevocableContext;
pub use crate::core::lookup::array_finger_table::ArrayFingerTable;
pub use crate::core::lookup::finger_table::{FingerIndex, FingerTable};
pub use crate::core::lookup::successor_list::SuccessorList;
pub use crate::core::model::address::Address;
pub use crate::core::model::identifier::Identifier;
pub use crate::core::model::identity::Identity;
pub use crate::core::model::ring::Ring;
pub use crate::core::store::DataStore;
