use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::aggregator::types::OrderBook;

/// Latest order book per `exchange:symbol` key.
///
/// Only the connection manager writes. Readers get clones and may see a book that is newer
/// than the analysis batch they are looking at; last write wins.
#[derive(Debug, Clone, Default)]
pub struct OrderBookStore {
    books: Arc<RwLock<HashMap<String, OrderBook>>>,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, book: OrderBook) {
        self.books.write().insert(key.to_string(), book);
    }

    pub fn get(&self, key: &str) -> Option<OrderBook> {
        self.books.read().get(key).cloned()
    }

    pub fn all(&self) -> HashMap<String, OrderBook> {
        self.books.read().clone()
    }

    /// Books for `symbol` on every venue.
    pub fn by_symbol(&self, symbol: &str) -> Vec<OrderBook> {
        self.books
            .read()
            .values()
            .filter(|book| book.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }
}
