pub mod connection;
pub mod retry;
pub mod simulated;
pub mod traits;
pub mod types;
pub mod venue;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::ConnectionManager;
pub use retry::RetryPolicy;
pub use simulated::SimulatedConnector;
pub use traits::{FeedConnector, FeedStream};
pub use types::{BookUpdate, Level, OrderBook};
pub use venue::Venue;
pub use websocket::WebSocketConnector;
