use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::traits::{FeedConnector, FeedStream};
use super::venue::Venue;
use crate::error::{PipelineError, Result};

const FRAME_BUFFER: usize = 1024;

pub struct WebSocketClient {
    url: String,
}

impl WebSocketClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    /// Opens the socket, sends the optional subscribe frame and pumps text frames into a
    /// channel until the venue closes the connection. Dropping the returned stream closes
    /// the socket.
    pub async fn connect(&self, venue: Venue, subscribe: Option<String>) -> Result<FeedStream> {
        let url = Url::parse(&self.url).map_err(|e| PipelineError::connection(venue.name(), e))?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| PipelineError::connection(venue.name(), e))?;
        let (mut write, mut read) = ws_stream.split();

        if let Some(frame) = subscribe {
            write
                .send(Message::Text(frame))
                .await
                .map_err(|e| PipelineError::connection(venue.name(), e))?;
        }

        let (sender, receiver) = mpsc::channel(FRAME_BUFFER);
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = read.next() => msg,
                    _ = sender.closed() => {
                        debug!(exchange = %venue, "Feed dropped, closing websocket");
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!(exchange = %venue, "Close frame not sent: {}", e);
                        }
                        break;
                    }
                };
                let Some(msg) = msg else {
                    break;
                };
                match msg {
                    Ok(Message::Text(text)) => {
                        if sender.send(text).await.is_err() {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            warn!(exchange = %venue, "Failed to answer ping: {}", e);
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(exchange = %venue, ?frame, "Venue closed websocket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(exchange = %venue, "Websocket read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(FeedStream::new(receiver))
    }
}

/// Connects to the venues' public websocket feeds.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn open(&self, venue: Venue, symbol: &str) -> Result<FeedStream> {
        WebSocketClient::new(&venue.stream_url(symbol))
            .connect(venue, venue.subscribe_message(symbol))
            .await
    }
}
