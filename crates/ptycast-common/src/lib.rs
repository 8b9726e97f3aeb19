pub mod errors;
pub mod id;
pub mod message;

pub use errors::{
    ConfigError, DeliveryError, ProtocolError, PtyIoError, QueueError, RelayError, StartError,
    SupervisorError,
};
pub use id::{new_id, ClientId};
pub use message::{MessageKind, RelayMessage};

pub type Result<T> = std::result::Result<T, RelayError>;
