use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::{FeedConnector, FeedStream};
use super::venue::Venue;
use crate::error::Result;

/// Generates random-walk books in each venue's own wire shape.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    pub tick: Duration,
    pub levels: usize,
    /// Closes the stream after this many frames, exercising the reconnect path.
    pub max_frames: Option<usize>,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            levels: 10,
            max_frames: None,
        }
    }
}

fn base_price(symbol: &str) -> f64 {
    match symbol.split('/').next().unwrap_or_default() {
        "BTC" => 65_000.0,
        "ETH" => 3_500.0,
        "SOL" => 150.0,
        _ => 100.0,
    }
}

fn venue_skew(venue: Venue) -> f64 {
    match venue {
        Venue::Binance => 1.0,
        Venue::Coinbase => 1.0004,
        Venue::Kraken => 0.9997,
    }
}

#[async_trait]
impl FeedConnector for SimulatedConnector {
    async fn open(&self, venue: Venue, symbol: &str) -> Result<FeedStream> {
        let (sender, receiver) = mpsc::channel(256);
        let config = self.clone();
        let symbol = symbol.to_string();

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut mid = base_price(&symbol) * venue_skew(venue);
            let mut interval = tokio::time::interval(config.tick);
            let mut sent = 0usize;

            loop {
                interval.tick().await;
                if config.max_frames.is_some_and(|max| sent >= max) {
                    debug!(exchange = %venue, symbol = %symbol, "Simulated feed closing");
                    break;
                }
                mid *= 1.0 + rng.gen_range(-0.0005..0.0005);
                let frame = render_frame(venue, &symbol, mid, config.levels, &mut rng);
                if sender.send(frame).await.is_err() {
                    break;
                }
                sent += 1;
            }
        });

        Ok(FeedStream::new(receiver))
    }
}

fn render_frame(venue: Venue, symbol: &str, mid: f64, levels: usize, rng: &mut StdRng) -> String {
    let tick = mid * 0.000_05;
    let half_spread = tick * rng.gen_range(1.0..6.0);
    let mut bids = Vec::with_capacity(levels);
    let mut asks = Vec::with_capacity(levels);
    for i in 0..levels {
        let offset = half_spread + tick * i as f64;
        bids.push((mid - offset, rng.gen_range(0.01..5.0), rng.gen_range(1..20u64)));
        asks.push((mid + offset, rng.gen_range(0.01..5.0), rng.gen_range(1..20u64)));
    }

    let now = Utc::now();
    match venue {
        Venue::Binance => {
            let side = |levels: &[(f64, f64, u64)]| -> Vec<Value> {
                levels
                    .iter()
                    .map(|(p, q, _)| json!([format!("{:.4}", p), format!("{:.6}", q)]))
                    .collect()
            };
            json!({"E": now.timestamp_millis(), "bids": side(&bids), "asks": side(&asks)}).to_string()
        }
        Venue::Coinbase => {
            let side = |levels: &[(f64, f64, u64)]| -> Vec<Value> {
                levels.iter().map(|(p, q, n)| json!([p, q, n])).collect()
            };
            json!({
                "type": "snapshot",
                "product_id": venue.native_symbol(symbol),
                "time": now.to_rfc3339(),
                "bids": side(&bids),
                "asks": side(&asks),
            })
            .to_string()
        }
        Venue::Kraken => {
            let ts = format!("{:.6}", now.timestamp_micros() as f64 / 1_000_000.0);
            let side = |levels: &[(f64, f64, u64)]| -> Vec<Value> {
                levels
                    .iter()
                    .map(|(p, q, _)| json!([format!("{:.4}", p), format!("{:.8}", q), ts.clone()]))
                    .collect()
            };
            json!([0, {"bs": side(&bids), "as": side(&asks)}, "book-10", venue.native_symbol(symbol)])
                .to_string()
        }
    }
}
