//! Candle providers.
//!
//! The analysis core never talks to an exchange. It asks a [`CandleProvider`]
//! for the most recent candles of a symbol and timeframe and works on the
//! returned slice.

use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::timeframe::Timeframe;
use crate::types::Candle;

/// Source of historical candles.
pub trait CandleProvider: Send + Sync {
    /// The most recent `limit` candles of `symbol` on `timeframe`, oldest
    /// first. A `limit` of zero returns everything available.
    fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;
}

fn keep_last(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    if limit > 0 && candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}

/// Reads `<dir>/<SYMBOL>_<timeframe>.csv` files with the header
/// `open_time,open,high,low,close,volume`.
#[derive(Debug, Clone)]
pub struct CsvCandleProvider {
    dir: PathBuf,
}

impl CsvCandleProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe))
    }

    /// Write `candles` where [`fetch_candles`](CandleProvider::fetch_candles) will find them.
    pub fn store(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(symbol, timeframe);
        let mut writer = WriterBuilder::new().from_path(&path)?;
        for candle in candles {
            writer.serialize(candle)?;
        }
        writer.flush()?;
        debug!("Wrote {} candles to {}", candles.len(), path.display());
        Ok(path)
    }
}

impl CandleProvider for CsvCandleProvider {
    fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Err(AnalysisError::DataUnavailable(format!(
                "no candle file for {} {} at {}",
                symbol,
                timeframe,
                path.display()
            )));
        }
        info!("Loading candles from: {}", path.display());

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| AnalysisError::DataUnavailable(format!("{}: {}", path.display(), e)))?;

        let mut candles = Vec::new();
        let mut skipped = 0;
        for (row_num, row) in reader.deserialize::<Candle>().enumerate() {
            match row {
                Ok(candle) if candle.validate() => candles.push(candle),
                Ok(candle) => {
                    debug!("Skipping row {} with inconsistent values: {:?}", row_num + 1, candle);
                    skipped += 1;
                }
                Err(e) => {
                    debug!("Skipping row {}: {}", row_num + 1, e);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!("Skipped {} invalid rows in {}", skipped, path.display());
        }

        candles.sort_by_key(|c| c.open_time);
        let before = candles.len();
        candles.dedup_by_key(|c| c.open_time);
        if candles.len() < before {
            warn!("Removed {} duplicate open times", before - candles.len());
        }

        if candles.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!(
                "{} contains no usable candles",
                path.display()
            )));
        }

        let candles = keep_last(candles, limit);
        info!("Loaded {} {} candles for {}", candles.len(), timeframe, symbol);
        Ok(candles)
    }
}

/// Provider backed by series held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert). A failed insert is logged.
    pub fn with(self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        if let Err(e) = self.insert(symbol, timeframe, candles) {
            warn!("Dropped {} {} candles: {}", symbol, timeframe, e);
        }
        self
    }

    /// Store `candles` for `symbol` and `timeframe`, replacing any previous
    /// series.
    pub fn insert(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Result<()> {
        let mut series = self.series.write().map_err(|_| poisoned())?;
        series.insert((symbol.to_uppercase(), timeframe), candles);
        Ok(())
    }
}

fn poisoned() -> AnalysisError {
    AnalysisError::DataUnavailable("candle store is poisoned".to_string())
}

impl CandleProvider for InMemoryProvider {
    fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let series = self
            .series
            .read()
            .map_err(|_| poisoned())?;
        series
            .get(&(symbol.to_uppercase(), timeframe))
            .map(|candles| keep_last(candles.clone(), limit))
            .ok_or_else(|| {
                AnalysisError::DataUnavailable(format!("no candles for {} {}", symbol, timeframe))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(i as i64 * 3_600_000, p, p + 1.0, p - 1.0, p + 0.5, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_csv_store_and_fetch() {
        let dir = TempDir::new().unwrap();
        let provider = CsvCandleProvider::new(dir.path());
        let path = provider.store("btcusdt", Timeframe::H1, &series(30)).unwrap();
        assert!(path.ends_with("BTCUSDT_1h.csv"));

        let all = provider.fetch_candles("BTCUSDT", Timeframe::H1, 0).unwrap();
        assert_eq!(all, series(30));

        let recent = provider.fetch_candles("BTCUSDT", Timeframe::H1, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], series(30)[20]);
    }

    #[test]
    fn test_csv_missing_file() {
        let dir = TempDir::new().unwrap();
        let provider = CsvCandleProvider::new(dir.path());
        let err = provider.fetch_candles("ETHUSDT", Timeframe::M5, 100).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[test]
    fn test_csv_skips_bad_rows_and_sorts() {
        let dir = TempDir::new().unwrap();
        let provider = CsvCandleProvider::new(dir.path());
        let mut file = std::fs::File::create(provider.path_for("X", Timeframe::D1)).unwrap();
        writeln!(file, "open_time,open,high,low,close,volume").unwrap();
        writeln!(file, "2000,10,11,9,10.5,1").unwrap();
        writeln!(file, "1000,10,11,9,10.5,1").unwrap();
        writeln!(file, "3000,10,9,11,10.5,1").unwrap(); // high < low
        writeln!(file, "4000,abc,11,9,10.5,1").unwrap();
        writeln!(file, "1000,10,11,9,10.5,1").unwrap(); // duplicate
        drop(file);

        let candles = provider.fetch_candles("X", Timeframe::D1, 0).unwrap();
        let times: Vec<i64> = candles.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![1000, 2000]);
    }

    #[test]
    fn test_in_memory_provider() {
        let provider = InMemoryProvider::new().with("sol", Timeframe::M15, series(50));
        assert_eq!(provider.fetch_candles("SOL", Timeframe::M15, 5).unwrap().len(), 5);
        assert!(provider.fetch_candles("SOL", Timeframe::H4, 5).is_err());
    }

    #[test]
    fn test_in_memory_insert_replaces_series() {
        let provider = InMemoryProvider::new();
        provider.insert("eth", Timeframe::H1, series(20)).unwrap();
        provider.insert("ETH", Timeframe::H1, series(8)).unwrap();
        assert_eq!(provider.fetch_candles("eth", Timeframe::H1, 0).unwrap().len(), 8);
    }

    #[test]
    fn test_poisoned_store_reports_unavailable() {
        let provider = std::sync::Arc::new(InMemoryProvider::new());
        let writer = std::sync::Arc::clone(&provider);
        let _ = std::thread::spawn(move || {
            let _guard = writer.series.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        let err = provider.insert("BTC", Timeframe::H1, series(5)).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
        let err = provider.fetch_candles("BTC", Timeframe::H1, 0).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));

        // The builder keeps going and only logs the failure
        let provider = std::sync::Arc::try_unwrap(provider).unwrap();
        let provider = provider.with("BTC", Timeframe::H4, series(5));
        assert!(provider.fetch_candles("BTC", Timeframe::H4, 0).is_err());
    }
}
