//! Adaptive block-range scanning for mint events

use std::sync::Arc;

use super::rpc::{ChainReader, MintEvent};

/// Initial window size, inclusive
pub const CHUNK_SIZE: u64 = 10_000;
/// Windows are not split below this size; a failing sub-range is given up.
pub const MIN_CHUNK: u64 = 2_000;

/// Result of one scan. A partial scan is still a result.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub events: Vec<MintEvent>,
    /// Inclusive sub-ranges that could not be read at the minimum size
    pub failed_ranges: Vec<(u64, u64)>,
}

pub struct ChainScanner {
    reader: Arc<dyn ChainReader>,
}

impl ChainScanner {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<dyn ChainReader> {
        &self.reader
    }

    /// Scan `[from_block, to_block]` in `CHUNK_SIZE` windows. A failing window
    /// is halved recursively while halves stay at or above `MIN_CHUNK`.
    pub async fn scan(&self, from_block: u64, to_block: u64) -> ScanReport {
        let mut report = ScanReport::default();
        if from_block > to_block {
            return report;
        }

        let mut start = from_block;
        while start <= to_block {
            let end = start.saturating_add(CHUNK_SIZE - 1).min(to_block);
            self.scan_window(start, end, &mut report).await;
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        if !report.failed_ranges.is_empty() {
            log::warn!(
                "[chain] Partial scan of {}..={}: {} sub-range(s) unreadable",
                from_block,
                to_block,
                report.failed_ranges.len()
            );
        }
        report
    }

    async fn scan_window(&self, start: u64, end: u64, report: &mut ScanReport) {
        // Depth-first so sub-ranges are attempted in block order
        let mut pending = vec![(start, end)];
        while let Some((from, to)) = pending.pop() {
            match self.reader.mint_logs(from, to).await {
                Ok(events) => {
                    log::debug!("[chain] {}..={}: {} mint(s)", from, to, events.len());
                    report.events.extend(events);
                }
                Err(e) => {
                    let size = to - from + 1;
                    let half = size / 2;
                    if half >= MIN_CHUNK {
                        log::warn!("[chain] {}..={} failed ({}), splitting", from, to, e);
                        let mid = from + half;
                        pending.push((mid, to));
                        pending.push((from, mid - 1));
                    } else {
                        log::warn!("[chain] Giving up on {}..={}: {}", from, to, e);
                        report.failed_ranges.push((from, to));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::chain::testing::FakeChain;

    fn mint(agent_id: u64, block_number: u64) -> MintEvent {
        MintEvent { agent_id, owner: format!("0x{:040x}", agent_id), block_number }
    }

    #[tokio::test]
    async fn test_windows_cover_range_in_order() {
        let chain = Arc::new(FakeChain {
            mints: vec![mint(1, 100), mint(2, 15_000), mint(3, 25_000)],
            ..Default::default()
        });
        let scanner = ChainScanner::new(chain.clone());

        let report = scanner.scan(0, 25_000).await;
        let ids: Vec<u64> = report.events.iter().map(|e| e.agent_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(report.failed_ranges.is_empty());
        assert_eq!(chain.queries(), vec![(0, 9_999), (10_000, 19_999), (20_000, 25_000)]);
    }

    #[tokio::test]
    async fn test_failing_window_halves_then_gives_up_and_continues() {
        let chain = Arc::new(FakeChain {
            mints: vec![mint(1, 500), mint(2, 12_000)],
            failing: vec![(3_000, 3_000)],
            ..Default::default()
        });
        let scanner = ChainScanner::new(chain.clone());

        let report = scanner.scan(0, 19_999).await;

        let queries = chain.queries();
        let sizes: Vec<u64> = queries.iter().map(|(a, b)| b - a + 1).collect();
        assert_eq!(sizes.iter().filter(|&&s| s == 10_000).count(), 2);
        assert_eq!(sizes.iter().filter(|&&s| s == 5_000).count(), 2);
        assert_eq!(
            queries,
            vec![
                (0, 9_999),
                (0, 4_999),
                (0, 2_499),
                (2_500, 4_999),
                (5_000, 9_999),
                (10_000, 19_999),
            ]
        );

        // Only the 2,500-block slice holding the bad block is lost
        assert_eq!(report.failed_ranges, vec![(2_500, 4_999)]);
        let ids: Vec<u64> = report.events.iter().map(|e| e.agent_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_whole_window_unreadable() {
        let chain = Arc::new(FakeChain { failing: vec![(0, 9_999)], ..Default::default() });
        let scanner = ChainScanner::new(chain.clone());

        let report = scanner.scan(0, 9_999).await;
        let sizes: Vec<u64> = chain.queries().iter().map(|(a, b)| b - a + 1).collect();
        assert_eq!(sizes, vec![10_000, 5_000, 2_500, 2_500, 5_000, 2_500, 2_500]);
        assert_eq!(report.failed_ranges.len(), 4);
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    async fn test_empty_range() {
        let chain = Arc::new(FakeChain::default());
        let report = ChainScanner::new(chain.clone()).scan(10, 9).await;
        assert!(report.events.is_empty());
        assert!(chain.queries().is_empty());
    }
}
