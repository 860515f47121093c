use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::ledger::Ledger;

/// Periodically compact the journal once `threshold` appends have piled up.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = ledger.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match ledger.compact_journal().await {
            Ok(()) => debug!("compacted journal after {appends} appends"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}

pub fn spawn_compactor(ledger: Arc<Ledger>, config: &LedgerConfig) -> JoinHandle<()> {
    tokio::spawn(run_compactor(ledger, config.compact_threshold, config.compact_interval))
}
