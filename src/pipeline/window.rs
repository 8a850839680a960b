//! Feature window selection
//!
//! `Latest` takes the N most recent rows. `Block` and `Sliding` replay the
//! full history for demos: a cursor advances on every invocation and picks
//! which contiguous N-row slice is sent to the predictor.

use std::ops::Range;

use parking_lot::Mutex;

use super::PipelineError;
use crate::models::FeatureRow;
use crate::store::DataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// N most recent rows
    Latest,
    /// Non-overlapping blocks of N, wrapping forever
    Block,
    /// Advances one row per run, then stops
    Sliding { max_runs: u64 },
}

impl WindowMode {
    pub fn parse(value: &str, sliding_max_runs: u64) -> Self {
        match value.trim().to_lowercase().as_str() {
            "block" => WindowMode::Block,
            "sliding" => WindowMode::Sliding { max_runs: sliding_max_runs },
            "latest" => WindowMode::Latest,
            other => {
                tracing::warn!("Unknown WINDOW_MODE '{}', using latest", other);
                WindowMode::Latest
            }
        }
    }
}

/// Exactly N feature rows in ascending timestamp order
#[derive(Debug, Clone)]
pub struct PredictionWindow {
    rows: Vec<FeatureRow>,
}

impl PredictionWindow {
    pub fn new(user_id: &str, mut rows: Vec<FeatureRow>, size: usize) -> Result<Self, PipelineError> {
        if rows.len() != size {
            return Err(PipelineError::InsufficientData {
                user_id: user_id.to_string(),
                required: size,
                available: rows.len(),
            });
        }
        rows.sort_by_key(|r| r.timestamp);
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Run counter for the demo modes. Lives only as long as the process.
#[derive(Debug)]
pub struct WindowCursor {
    mode: WindowMode,
    runs: u64,
}

impl WindowCursor {
    pub fn new(mode: WindowMode) -> Self {
        Self { mode, runs: 0 }
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Slice of a `history_len`-row history to use for this run, advancing the
    /// cursor. `None` once sliding mode has used up its budget. Callers check
    /// `history_len >= size` first.
    pub fn advance(&mut self, history_len: usize, size: usize) -> Option<Range<usize>> {
        match self.mode {
            WindowMode::Latest => {
                self.runs += 1;
                let start = history_len.saturating_sub(size);
                Some(start..history_len)
            }
            WindowMode::Block => {
                let blocks = (history_len / size).max(1) as u64;
                let block = (self.runs % blocks) as usize;
                self.runs += 1;
                Some(block * size..(block + 1) * size)
            }
            WindowMode::Sliding { max_runs } => {
                let start = self.runs as usize;
                if self.runs >= max_runs || start + size > history_len {
                    return None;
                }
                self.runs += 1;
                Some(start..start + size)
            }
        }
    }
}

/// Picks the window for each run and owns the cycling state.
#[derive(Debug)]
pub struct WindowSelector {
    size: usize,
    mode: WindowMode,
    cursor: Mutex<WindowCursor>,
}

impl WindowSelector {
    pub fn new(size: usize, mode: WindowMode) -> Self {
        Self {
            size,
            mode,
            cursor: Mutex::new(WindowCursor::new(mode)),
        }
    }

    /// Window for this run, or `None` when sliding mode is exhausted.
    pub async fn select(
        &self,
        store: &dyn DataStore,
        user_id: &str,
    ) -> Result<Option<PredictionWindow>, PipelineError> {
        if self.mode == WindowMode::Latest {
            let rows = select_recent(store, user_id, self.size).await?;
            return Ok(Some(rows));
        }

        let mut history = store
            .feature_history(user_id)
            .await
            .map_err(PipelineError::DataAccess)?;

        if history.len() < self.size {
            if let WindowMode::Sliding { .. } = self.mode {
                tracing::info!(
                    available = history.len(),
                    required = self.size,
                    "Sliding window does not fit the history, nothing to replay"
                );
                return Ok(None);
            }
            return Err(PipelineError::InsufficientData {
                user_id: user_id.to_string(),
                required: self.size,
                available: history.len(),
            });
        }

        // No await while the cursor is held.
        let range = {
            let mut cursor = self.cursor.lock();
            let range = cursor.advance(history.len(), self.size);
            if let Some(r) = &range {
                tracing::debug!(run = cursor.runs(), rows = ?r, "Window selected");
            }
            range
        };

        match range {
            Some(r) => {
                let rows: Vec<FeatureRow> = history.drain(r).collect();
                PredictionWindow::new(user_id, rows, self.size).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// The `size` most recent rows for a user, oldest first.
pub async fn select_recent(
    store: &dyn DataStore,
    user_id: &str,
    size: usize,
) -> Result<PredictionWindow, PipelineError> {
    let rows = store
        .recent_features(user_id, size)
        .await
        .map_err(PipelineError::DataAccess)?;

    PredictionWindow::new(user_id, rows, size)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    pub fn history(user_id: &str, count: usize) -> Vec<FeatureRow> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| FeatureRow {
                user_id: user_id.to_string(),
                timestamp: start + Duration::hours(i as i64),
                workload: i as f64,
                stress: (i % 10) as f64,
                hrv: 40.0 + i as f64,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_exact_history_succeeds() {
        let store = MemoryStore::with_features(history("u1", 24));
        let window = select_recent(&store, "u1", 24).await.unwrap();
        assert_eq!(window.len(), 24);
        assert!(window.rows().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_short_history_is_insufficient() {
        let store = MemoryStore::with_features(history("u1", 23));
        let err = select_recent(&store, "u1", 24).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { required: 24, available: 23, .. }
        ));
    }

    #[tokio::test]
    async fn test_latest_takes_most_recent_rows() {
        let store = MemoryStore::with_features(history("u1", 30));
        let window = select_recent(&store, "u1", 24).await.unwrap();
        assert_eq!(window.rows()[0].workload, 6.0);
        assert_eq!(window.rows()[23].workload, 29.0);
    }

    #[tokio::test]
    async fn test_store_failure_is_data_access() {
        let store = MemoryStore {
            fail_reads: true,
            ..Default::default()
        };
        let err = select_recent(&store, "u1", 24).await.unwrap_err();
        assert!(matches!(err, PipelineError::DataAccess(_)));
    }

    #[test]
    fn test_block_mode_wraps_single_block() {
        let mut cursor = WindowCursor::new(WindowMode::Block);
        assert_eq!(cursor.advance(24, 24), Some(0..24));
        assert_eq!(cursor.advance(24, 24), Some(0..24));
    }

    #[test]
    fn test_block_mode_cycles_blocks() {
        let mut cursor = WindowCursor::new(WindowMode::Block);
        assert_eq!(cursor.advance(50, 24), Some(0..24));
        assert_eq!(cursor.advance(50, 24), Some(24..48));
        assert_eq!(cursor.advance(50, 24), Some(0..24));
    }

    #[test]
    fn test_sliding_mode_stops_at_end_of_rows() {
        let mut cursor = WindowCursor::new(WindowMode::Sliding { max_runs: 100 });
        assert_eq!(cursor.advance(26, 24), Some(0..24));
        assert_eq!(cursor.advance(26, 24), Some(1..25));
        assert_eq!(cursor.advance(26, 24), Some(2..26));
        assert_eq!(cursor.advance(26, 24), None);
        assert_eq!(cursor.advance(26, 24), None);
        assert_eq!(cursor.runs(), 3);
    }

    #[test]
    fn test_sliding_mode_stops_at_run_budget() {
        let mut cursor = WindowCursor::new(WindowMode::Sliding { max_runs: 2 });
        assert!(cursor.advance(100, 24).is_some());
        assert!(cursor.advance(100, 24).is_some());
        assert_eq!(cursor.advance(100, 24), None);
    }

    #[tokio::test]
    async fn test_selector_block_mode_first_run_uses_first_rows() {
        let store = MemoryStore::with_features(history("u1", 24));
        let selector = WindowSelector::new(24, WindowMode::Block);

        let first = selector.select(&store, "u1").await.unwrap().unwrap();
        assert_eq!(first.rows()[0].workload, 0.0);
        assert_eq!(first.rows()[23].workload, 23.0);

        let second = selector.select(&store, "u1").await.unwrap().unwrap();
        assert_eq!(second.rows()[0].workload, 0.0);
    }

    #[tokio::test]
    async fn test_selector_sliding_exhausted_is_none() {
        let store = MemoryStore::with_features(history("u1", 24));
        let selector = WindowSelector::new(24, WindowMode::Sliding { max_runs: 10 });

        assert!(selector.select(&store, "u1").await.unwrap().is_some());
        assert!(selector.select(&store, "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_selector_sliding_short_history_is_none() {
        let store = MemoryStore::with_features(history("u1", 23));
        let selector = WindowSelector::new(24, WindowMode::Sliding { max_runs: 10 });

        assert!(selector.select(&store, "u1").await.unwrap().is_none());
        assert_eq!(selector.cursor.lock().runs(), 0);
    }

    #[tokio::test]
    async fn test_selector_block_short_history_is_insufficient() {
        let store = MemoryStore::with_features(history("u1", 23));
        let selector = WindowSelector::new(24, WindowMode::Block);

        let err = selector.select(&store, "u1").await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { available: 23, .. }));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(WindowMode::parse("Block", 5), WindowMode::Block);
        assert_eq!(WindowMode::parse("sliding", 5), WindowMode::Sliding { max_runs: 5 });
        assert_eq!(WindowMode::parse("bogus", 5), WindowMode::Latest);
    }
}
