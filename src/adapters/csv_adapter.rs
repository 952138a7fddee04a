//! CSV file candle adapter.
//!
//! One file per (symbol, interval): `{symbol}_{interval}.csv` with columns
//! `timestamp,open,high,low,close,volume`. Timestamps are epoch
//! milliseconds or `%Y-%m-%d %H:%M:%S` / `%Y-%m-%d` strings.

use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

use crate::domain::candle::{Candle, TimestampMs};
use crate::domain::error::GridtraderError;
use crate::ports::candle_port::CandlePort;

pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

impl CsvCandleAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }

    fn parse_timestamp(raw: &str) -> Result<TimestampMs, GridtraderError> {
        if let Ok(ms) = raw.parse::<i64>() {
            return Ok(ms);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Ok(dt.and_utc().timestamp_millis());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight.and_utc().timestamp_millis());
            }
        }
        Err(GridtraderError::Data {
            reason: format!("invalid timestamp '{}'", raw),
        })
    }

    fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, GridtraderError> {
        record
            .get(idx)
            .ok_or_else(|| GridtraderError::Data {
                reason: format!("missing {} column", name),
            })?
            .parse()
            .map_err(|e| GridtraderError::Data {
                reason: format!("invalid {} value: {}", name, e),
            })
    }

    fn read_all(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>, GridtraderError> {
        let path = self.csv_path(symbol, interval);
        let content = fs::read_to_string(&path).map_err(|e| GridtraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| GridtraderError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let raw_ts = record.get(0).ok_or_else(|| GridtraderError::Data {
                reason: "missing timestamp column".into(),
            })?;
            let timestamp = Self::parse_timestamp(raw_ts)?;

            candles.push(Candle {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                timestamp,
                open: Self::parse_field(&record, 1, "open")?,
                high: Self::parse_field(&record, 2, "high")?,
                low: Self::parse_field(&record, 3, "low")?,
                close: Self::parse_field(&record, 4, "close")?,
                volume: Self::parse_field(&record, 5, "volume")?,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

impl CandlePort for CsvCandleAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<Candle>, GridtraderError> {
        let mut candles = self.read_all(symbol, interval)?;
        candles.retain(|c| c.timestamp >= start && c.timestamp <= end);
        Ok(candles)
    }

    fn list_symbols(&self, interval: &str) -> Result<Vec<String>, GridtraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| GridtraderError::Data {
            reason: format!("failed to read directory {}: {}", self.base_path.display(), e),
        })?;

        let suffix = format!("_{}.csv", interval);
        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| GridtraderError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.ends_with(&suffix) {
                symbols.push(name_str[..name_str.len() - suffix.len()].to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn data_range(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<(TimestampMs, TimestampMs, usize)>, GridtraderError> {
        let candles = self.read_all(symbol, interval)?;
        Ok(match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, candles.len())),
            _ => None,
        })
    }
}
