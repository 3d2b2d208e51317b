use async_trait::async_trait;
use tokio::sync::mpsc;

use super::venue::Venue;
use crate::error::Result;

/// Raw text frames from one open stream. The stream is closed when `recv` yields `None`.
pub struct FeedStream {
    receiver: mpsc::Receiver<String>,
}

impl FeedStream {
    pub fn new(receiver: mpsc::Receiver<String>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

/// Source of market data streams. Live websockets, simulated generators and test fixtures
/// all sit behind this.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn open(&self, venue: Venue, symbol: &str) -> Result<FeedStream>;
}
