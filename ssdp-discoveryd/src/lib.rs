pub mod config;
pub mod discovery;
pub mod error;
pub mod net;
pub mod pool;
pub mod scope;

pub use discovery::DiscoveryService;
pub use error::TransportError;
pub use pool::{ControlPool, InterfacePool};
pub use scope::Scope;
