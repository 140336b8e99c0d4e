// =============================================================================
// Bar buffering — per-(symbol, timeframe) ring buffer of OHLCV bars
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar returned by the Data Adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
}

/// Composite key that identifies a unique bar series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct BarKey {
    pub symbol: String,
    pub timeframe: String,
}

impl std::fmt::Display for BarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Thread-safe ring buffer that stores the most recent bars per
/// `(symbol, timeframe)` pair, sequences immutable per cycle and ordered by
/// timestamp ascending.
pub struct BarBuffer {
    buffers: RwLock<HashMap<BarKey, VecDeque<Bar>>>,
    max_bars: usize,
}

impl BarBuffer {
    pub fn new(max_bars: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_bars,
        }
    }

    /// Replace the series for `key` with a freshly fetched, ascending-order
    /// sequence of bars, trimmed to `max_bars`.
    pub fn replace(&self, key: BarKey, bars: Vec<Bar>) {
        let mut map = self.buffers.write();
        let mut ring: VecDeque<Bar> = bars.into_iter().collect();
        while ring.len() > self.max_bars {
            ring.pop_front();
        }
        map.insert(key, ring);
    }

    pub fn get(&self, key: &BarKey, count: usize) -> Vec<Bar> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn get_closes(&self, key: &BarKey, count: usize) -> Vec<f64> {
        self.get(key, count).iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self, key: &BarKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key).and_then(|ring| ring.back()).map(|b| b.close)
    }

    pub fn count(&self, key: &BarKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts_secs: i64, close: f64) -> Bar {
        Bar {
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            vwap: close,
        }
    }

    fn make_key(sym: &str, tf: &str) -> BarKey {
        BarKey {
            symbol: sym.into(),
            timeframe: tf.into(),
        }
    }

    #[test]
    fn replace_trims_to_max() {
        let buf = BarBuffer::new(3);
        let key = make_key("AAPL", "5m");
        let bars: Vec<Bar> = (0..5).map(|i| bar(i * 300, 100.0 + i as f64)).collect();
        buf.replace(key.clone(), bars);

        assert_eq!(buf.count(&key), 3);
        let closes = buf.get_closes(&key, 10);
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn last_close_empty_returns_none() {
        let buf = BarBuffer::new(10);
        let key = make_key("MSFT", "1h");
        assert_eq!(buf.last_close(&key), None);
    }

    #[test]
    fn get_respects_count() {
        let buf = BarBuffer::new(50);
        let key = make_key("AAPL", "5m");
        let bars: Vec<Bar> = (0..10).map(|i| bar(i * 300, 100.0 + i as f64)).collect();
        buf.replace(key.clone(), bars);
        assert_eq!(buf.get(&key, 3).len(), 3);
        assert_eq!(buf.get_closes(&key, 3), vec![107.0, 108.0, 109.0]);
    }
}
