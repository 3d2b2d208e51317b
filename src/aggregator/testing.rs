use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{FeedConnector, FeedStream};
use super::venue::Venue;
use crate::error::Result;

/// Connector whose streams are fed by the test. Dropping the senders closes the streams.
#[derive(Default)]
pub struct ChannelConnector {
    senders: Mutex<Vec<(Venue, String, mpsc::Sender<String>)>>,
    opens: AtomicUsize,
}

impl ChannelConnector {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sends a frame on the most recently opened stream.
    pub async fn send(&self, frame: &str) {
        let sender = self.senders.lock().last().map(|(_, _, s)| s.clone());
        if let Some(sender) = sender {
            let _ = sender.send(frame.to_string()).await;
        }
    }

    /// Sends a frame on the most recently opened stream for the pair.
    pub async fn send_to(&self, venue: Venue, symbol: &str, frame: &str) {
        let sender = self
            .senders
            .lock()
            .iter()
            .rev()
            .find(|(v, s, _)| *v == venue && s == symbol)
            .map(|(_, _, s)| s.clone());
        if let Some(sender) = sender {
            let _ = sender.send(frame.to_string()).await;
        }
    }

    pub fn close_all(&self) {
        self.senders.lock().clear();
    }
}

#[async_trait]
impl FeedConnector for ChannelConnector {
    async fn open(&self, venue: Venue, symbol: &str) -> Result<FeedStream> {
        let (sender, receiver) = mpsc::channel(64);
        self.senders.lock().push((venue, symbol.to_string(), sender));
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FeedStream::new(receiver))
    }
}
