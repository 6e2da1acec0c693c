pub mod connection;
pub mod decision_relay;
pub mod events;

pub use connection::ConnectionState;
pub use decision_relay::{shutdown_requested, DecisionRelay, RelayError};
pub use events::RelayEvent;
