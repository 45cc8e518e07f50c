pub mod interfaces;
pub mod search;
pub mod transport;
