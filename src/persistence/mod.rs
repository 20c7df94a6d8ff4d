use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::PnlError;
use crate::models::PnlRecord;

pub const PNL_HEADER: [&str; 3] = ["Time", "Symbol", "PnL"];
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a realized-PnL row looks like once written: second-resolution time,
/// symbol, amount
///
/// Distinct fills can share a key (same second, same size), so keys are
/// counted rather than treated as unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PnlKey {
    time: DateTime<Utc>,
    symbol: String,
    amount: String,
}

impl PnlKey {
    pub fn of(record: &PnlRecord) -> Self {
        Self {
            time: record.timestamp.with_nanosecond(0).unwrap_or(record.timestamp),
            symbol: record.symbol.clone(),
            amount: normalize_amount(&record.realized.to_string()),
        }
    }

    fn from_fields(time: &str, symbol: &str, amount: &str) -> Option<Self> {
        let time = NaiveDateTime::parse_from_str(time.trim(), TIME_FORMAT).ok()?.and_utc();
        Some(Self {
            time,
            symbol: symbol.trim().to_string(),
            amount: normalize_amount(amount),
        })
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

// "1.50" and "1.5" are the same amount
fn normalize_amount(amount: &str) -> String {
    amount
        .trim()
        .parse::<Decimal>()
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|_| amount.trim().to_string())
}

pub fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}

/// Append-only CSV log of realized PnL (`Time,Symbol,PnL`)
#[derive(Debug, Clone)]
pub struct PnlLog {
    path: PathBuf,
}

impl PnlLog {
    /// Open the log, writing the header if the file is new or empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PnlError> {
        let path = path.as_ref().to_path_buf();

        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if is_empty {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(PNL_HEADER)?;
            writer.flush()?;
            tracing::info!("📝 Created PnL log at {}", path.display());
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records in order; returns how many rows were written
    pub fn append(&self, records: &[PnlRecord]) -> Result<usize, PnlError> {
        if records.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for record in records {
            writer.write_record([
                format_time(record.timestamp),
                record.symbol.clone(),
                record.realized.to_string(),
            ])?;
        }
        writer.flush()?;

        Ok(records.len())
    }

    /// How many rows the log already holds for each key
    pub fn logged_keys(&self) -> Result<HashMap<PnlKey, usize>, PnlError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut keys = HashMap::new();
        for row in reader.records() {
            let row = row?;
            let key = match (row.get(0), row.get(1), row.get(2)) {
                (Some(time), Some(symbol), Some(amount)) => PnlKey::from_fields(time, symbol, amount),
                _ => None,
            };
            match key {
                Some(key) => *keys.entry(key).or_insert(0) += 1,
                None => tracing::debug!("Skipping unreadable PnL row: {:?}", row),
            }
        }

        Ok(keys)
    }
}
