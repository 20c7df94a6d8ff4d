use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::PnlError;
use crate::models::PnlRecord;
use crate::persistence::{PnlKey, PnlLog};
use crate::venue::PnlSource;

/// What one reporting pass saw and wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PnlSummary {
    pub records_seen: usize,
    pub records_written: usize,
    /// Sum of every record returned for the window
    pub total: Decimal,
}

/// Copies recently realized PnL from the venue into the CSV log
///
/// The lookback window is usually longer than the gap between passes, so the
/// same fills come back more than once. With `dedupe` on, rows already in the
/// log (from this process or an earlier run) are not written again. Keys are
/// counted, so two fills in the same second with the same amount are both
/// kept.
pub struct PnlReporter<S> {
    source: S,
    log: PnlLog,
    window: Duration,
    dedupe: bool,
    logged: HashMap<PnlKey, usize>,
}

impl<S: PnlSource> PnlReporter<S> {
    pub fn new(source: S, log: PnlLog, window: Duration, dedupe: bool) -> Result<Self, PnlError> {
        let logged = if dedupe {
            log.logged_keys()?
        } else {
            HashMap::new()
        };

        Ok(Self {
            source,
            log,
            window,
            dedupe,
            logged,
        })
    }

    pub async fn report(&mut self, now: DateTime<Utc>) -> Result<PnlSummary, PnlError> {
        let since = now - self.window;
        let records = self.source.realized_pnl(since).await?;
        self.forget_before(since);

        if records.is_empty() {
            tracing::info!("📭 No new realized PnL");
            return Ok(PnlSummary::default());
        }

        let total: Decimal = records.iter().map(|r| r.realized).sum();

        let fresh = if self.dedupe {
            self.unlogged(&records)
        } else {
            records.clone()
        };

        // Keys are remembered only once the rows are on disk
        let written = self.log.append(&fresh)?;
        if self.dedupe {
            for record in &fresh {
                *self.logged.entry(PnlKey::of(record)).or_insert(0) += 1;
            }
        }
        for record in &fresh {
            tracing::info!("💸 {} | PnL: {:.2} USDT", record.symbol, record.realized);
        }
        if written < records.len() {
            tracing::debug!("Skipped {} PnL record(s) already logged", records.len() - written);
        }

        tracing::info!(
            "💰 Realized PnL over last {} min: {} USDT",
            self.window.num_minutes(),
            total.round_dp(2)
        );

        Ok(PnlSummary {
            records_seen: records.len(),
            records_written: written,
            total,
        })
    }

    /// Records beyond what the log already holds for their key
    fn unlogged(&self, records: &[PnlRecord]) -> Vec<PnlRecord> {
        let mut in_window: HashMap<PnlKey, usize> = HashMap::new();

        records
            .iter()
            .filter(|record| {
                let key = PnlKey::of(record);
                let already = self.logged.get(&key).copied().unwrap_or(0);
                let count = in_window.entry(key).or_insert(0);
                *count += 1;
                *count > already
            })
            .cloned()
            .collect()
    }

    /// Drop keys the venue can no longer return for this window
    fn forget_before(&mut self, since: DateTime<Utc>) {
        // Keys are truncated to the second, so keep the second `since` falls in
        self.logged
            .retain(|key, _| key.time() + Duration::seconds(1) > since);
    }

    #[cfg(test)]
    fn remembered_keys(&self) -> usize {
        self.logged.len()
    }
}
