pub mod aggregator;
pub mod config;
pub mod connection;
pub mod events;
pub mod producer;
pub mod session;
pub mod simulator;
pub mod transport;

pub use aggregator::{ConnectionState, StateSnapshot};
pub use config::ConfigSet;
pub use events::CanonicalEvent;
pub use session::{SessionController, SessionError};
