pub mod address;
pub mod identifier;
pub mod identity;
pub mod ring;
