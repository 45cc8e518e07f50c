pub mod error;
pub mod headers;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::MessageError;
pub use headers::Header;
pub use message::{Message, MessageType};
pub use types::{Advertisement, Command, Notification, Update};
