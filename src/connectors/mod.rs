pub mod dial_in;
pub mod dial_out;

pub use dial_in::{ConnectorState, DialInConnector};
pub use dial_out::DialOutServer;
