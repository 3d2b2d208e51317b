use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::traits::{FeedConnector, FeedStream};
use super::types::{book_key, BookUpdate, OrderBook};
use super::venue::Venue;
use crate::error::Result;
use crate::latency::LatencyMonitor;
use crate::store::OrderBookStore;

/// Owns one supervised stream per `(exchange, symbol)` pair and is the only writer of the
/// order book store.
pub struct ConnectionManager {
    connector: Arc<dyn FeedConnector>,
    store: OrderBookStore,
    latency: LatencyMonitor,
    updates: mpsc::Sender<BookUpdate>,
    retry: RetryPolicy,
    active: Arc<AtomicBool>,
    streams: Mutex<HashMap<String, JoinHandle<()>>>,
}

struct StreamContext {
    venue: Venue,
    symbol: String,
    key: String,
    connector: Arc<dyn FeedConnector>,
    store: OrderBookStore,
    latency: LatencyMonitor,
    updates: mpsc::Sender<BookUpdate>,
    retry: RetryPolicy,
    active: Arc<AtomicBool>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        store: OrderBookStore,
        latency: LatencyMonitor,
        updates: mpsc::Sender<BookUpdate>,
        retry: RetryPolicy,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connector,
            store,
            latency,
            updates,
            retry,
            active,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a stream for the pair, tearing down any stream already registered for it.
    pub fn connect(&self, exchange: &str, symbol: &str) -> Result<()> {
        let venue = Venue::from_name(exchange)?;
        let key = book_key(venue.name(), symbol);

        let context = StreamContext {
            venue,
            symbol: symbol.to_string(),
            key: key.clone(),
            connector: self.connector.clone(),
            store: self.store.clone(),
            latency: self.latency.clone(),
            updates: self.updates.clone(),
            retry: self.retry.clone(),
            active: self.active.clone(),
        };

        let mut streams = self.streams.lock();
        if let Some(previous) = streams.remove(&key) {
            debug!(stream = %key, "Replacing existing stream");
            previous.abort();
        }
        streams.insert(key, tokio::spawn(supervise(context)));
        Ok(())
    }

    /// Closes every stream and clears the registry. Streams that already ended are fine.
    pub fn stop_all(&self) {
        let mut streams = self.streams.lock();
        for (key, handle) in streams.drain() {
            if !handle.is_finished() {
                debug!(stream = %key, "Closing stream");
            }
            handle.abort();
        }
    }

    pub fn open_streams(&self) -> Vec<String> {
        self.streams
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Keeps one pair's stream alive: open, pump frames until close, back off, repeat. Stops
/// reconnecting as soon as the pipeline is no longer active.
async fn supervise(ctx: StreamContext) {
    let mut backoff = ctx.retry.backoff();
    loop {
        if !ctx.active.load(Ordering::SeqCst) {
            break;
        }

        let started = Instant::now();
        match ctx.connector.open(ctx.venue, &ctx.symbol).await {
            Ok(stream) => {
                ctx.latency.record_network(ctx.venue.name(), started.elapsed());
                backoff.reset();
                info!(exchange = %ctx.venue, symbol = %ctx.symbol, "Stream open");
                pump(&ctx, stream).await;
                warn!(exchange = %ctx.venue, symbol = %ctx.symbol, "Stream closed");
            }
            Err(e) => {
                warn!(exchange = %ctx.venue, symbol = %ctx.symbol, "Failed to open stream: {}", e);
            }
        }

        if !ctx.active.load(Ordering::SeqCst) {
            debug!(stream = %ctx.key, "Pipeline stopped, not reconnecting");
            break;
        }
        let delay = backoff.next_delay();
        info!(
            exchange = %ctx.venue,
            symbol = %ctx.symbol,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn pump(ctx: &StreamContext, mut stream: FeedStream) {
    let mut last: Option<OrderBook> = None;
    while let Some(frame) = stream.recv().await {
        let received_at = Utc::now();
        let parse_started = Instant::now();

        let message = match ctx.venue.parse(&frame) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(exchange = %ctx.venue, symbol = %ctx.symbol, "Dropping message: {}", e);
                continue;
            }
        };

        let data_latency = message
            .event_time
            .and_then(|t| (received_at - t).to_std().ok())
            .unwrap_or_else(|| parse_started.elapsed());

        let Some(book) = message.apply(last.as_ref(), ctx.venue, &ctx.symbol) else {
            debug!(stream = %ctx.key, "Delta before snapshot, skipping");
            continue;
        };

        ctx.latency.record_data(ctx.venue.name(), data_latency);
        ctx.store.put(&ctx.key, book.clone());
        last = Some(book.clone());

        match ctx.updates.try_send(BookUpdate { book, received_at }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(stream = %ctx.key, "Update queue full, store still holds the latest book");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
