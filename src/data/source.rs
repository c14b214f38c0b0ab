/// Bar sources: where daily history comes from
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::data::bar::Bar;
use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

/// Supplier of bar history for a set of symbols
///
/// The concrete downloader lives behind this seam; the engine only ever
/// sees ordered oldest-to-newest daily bars.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Symbols this source can serve, in iteration order
    async fn symbols(&self) -> Result<Vec<String>>;

    /// Full daily history for a symbol, oldest to newest
    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>>;

    /// The most recent bar for a symbol
    async fn current_bar(&self, symbol: &str) -> Result<Bar>;
}

/// In-memory bar source for tests and demos
#[derive(Debug, Default)]
pub struct StaticBarSource {
    series: HashMap<String, Vec<Bar>>,
}

impl StaticBarSource {
    pub fn new() -> Self {
        StaticBarSource {
            series: HashMap::new(),
        }
    }

    pub fn with_series(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.series.insert(symbol.to_string(), bars);
        self
    }

    fn series_for(&self, symbol: &str) -> Result<&Vec<Bar>> {
        let bars = self
            .series
            .get(symbol)
            .ok_or_else(|| TradingError::NoBarsForSymbol(symbol.to_string()))?;
        if bars.is_empty() {
            return Err(TradingError::InsufficientBars(format!(
                "no history recorded for {}",
                symbol
            )));
        }
        Ok(bars)
    }
}

#[async_trait]
impl BarSource for StaticBarSource {
    async fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        Ok(self.series_for(symbol)?.clone())
    }

    async fn current_bar(&self, symbol: &str) -> Result<Bar> {
        let bars = self.series_for(symbol)?;
        Ok(bars[bars.len() - 1].clone())
    }
}

/// CSV row shape: date,open,high,low,close,volume
#[derive(Debug, Deserialize)]
struct BarRecord {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
}

/// File-backed bar source, one `<SYMBOL>.csv` per symbol
pub struct CsvBarSource {
    data_dir: PathBuf,
    watchlist: Vec<String>,
}

impl CsvBarSource {
    pub fn new<P: AsRef<Path>>(data_dir: P, watchlist: Vec<String>) -> Self {
        CsvBarSource {
            data_dir: data_dir.as_ref().to_path_buf(),
            watchlist,
        }
    }

    fn load_series(&self, symbol: &str) -> Result<Vec<Bar>> {
        let path = self.data_dir.join(format!("{}.csv", symbol));
        if !path.exists() {
            return Err(TradingError::NoBarsForSymbol(symbol.to_string()));
        }

        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| TradingError::BarValidation(format!("{}: {}", path.display(), e)))?;
        let mut bars = Vec::new();
        for record in reader.deserialize::<BarRecord>() {
            let record = record
                .map_err(|e| TradingError::BarValidation(format!("{}: {}", path.display(), e)))?;
            let bar = Bar::new(
                TradingDateTime::from_daily_close(record.date)?,
                Money::usd(record.open),
                Money::usd(record.high),
                Money::usd(record.low),
                Money::usd(record.close),
                record.volume,
            )?;
            bars.push(bar);
        }

        if bars.is_empty() {
            return Err(TradingError::InsufficientBars(format!(
                "{} holds no rows",
                path.display()
            )));
        }
        debug!("Loaded {} bars for {} from {}", bars.len(), symbol, path.display());
        Ok(bars)
    }
}

#[async_trait]
impl BarSource for CsvBarSource {
    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.watchlist.clone())
    }

    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        self.load_series(symbol)
    }

    async fn current_bar(&self, symbol: &str) -> Result<Bar> {
        let bars = self.load_series(symbol)?;
        Ok(bars[bars.len() - 1].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_bar(date: NaiveDate, close: Decimal) -> Bar {
        Bar::new(
            TradingDateTime::from_daily_close(date).unwrap(),
            Money::usd(close),
            Money::usd(close),
            Money::usd(close),
            Money::usd(close),
            1_000,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_static_source_round_trip() {
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let source = StaticBarSource::new().with_series(
            "AAPL",
            vec![sample_bar(monday, dec!(150)), sample_bar(monday, dec!(151))],
        );

        assert_eq!(source.symbols().await.unwrap(), vec!["AAPL".to_string()]);
        assert_eq!(source.bars("AAPL").await.unwrap().len(), 2);
        assert_eq!(
            source.current_bar("AAPL").await.unwrap().close().amount,
            dec!(151)
        );
    }

    #[tokio::test]
    async fn test_static_source_unknown_symbol() {
        let source = StaticBarSource::new();
        assert!(matches!(
            source.bars("MSFT").await,
            Err(TradingError::NoBarsForSymbol(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source_empty_history() {
        let source = StaticBarSource::new().with_series("AAPL", vec![]);
        assert!(matches!(
            source.bars("AAPL").await,
            Err(TradingError::InsufficientBars(_))
        ));
    }

    #[tokio::test]
    async fn test_csv_source_missing_file() {
        let source = CsvBarSource::new("/nonexistent", vec!["AAPL".to_string()]);
        assert!(matches!(
            source.bars("AAPL").await,
            Err(TradingError::NoBarsForSymbol(_))
        ));
    }
}
