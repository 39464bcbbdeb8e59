pub mod connection;
pub mod hub;
pub mod registry;

pub use connection::handle_connection;
pub use hub::ChatHub;
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionState, Phase, RegistryError};
