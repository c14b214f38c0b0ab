/// Yahoo Finance bar source (daily chart endpoint)
///
/// History for the whole watchlist is fetched once at connect time and
/// served from memory afterwards, so one trading cycle sees a single
/// consistent snapshot of the market.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::data::bar::Bar;
use crate::data::source::BarSource;
use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const LOOKBACK: &str = "300d";
const MAX_SYMBOLS: usize = 600;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize, Default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<i64>>,
}

/// Bar source backed by Yahoo's daily chart API
pub struct YahooBarSource {
    watchlist: Vec<String>,
    cache: HashMap<String, Vec<Bar>>,
}

impl YahooBarSource {
    /// Fetch daily history for every symbol and hold it in memory
    pub async fn connect(watchlist: Vec<String>) -> Result<Self> {
        if watchlist.is_empty() {
            return Err(TradingError::ConfigError(
                "watchlist for the Yahoo bar source is empty".to_string(),
            ));
        }
        if watchlist.len() > MAX_SYMBOLS {
            return Err(TradingError::ConfigError(format!(
                "Yahoo bar source supports at most {} symbols, got {}",
                MAX_SYMBOLS,
                watchlist.len()
            )));
        }

        let client = reqwest::Client::new();
        let mut cache = HashMap::new();
        for symbol in &watchlist {
            let bars = fetch_daily(&client, symbol).await?;
            debug!("Fetched {} daily bars for {}", bars.len(), symbol);
            cache.insert(symbol.clone(), bars);
        }
        Ok(YahooBarSource { watchlist, cache })
    }

    fn cached(&self, symbol: &str) -> Result<&Vec<Bar>> {
        let bars = self
            .cache
            .get(symbol)
            .ok_or_else(|| TradingError::NoBarsForSymbol(symbol.to_string()))?;
        if bars.is_empty() {
            return Err(TradingError::InsufficientBars(format!(
                "Yahoo returned no usable daily bars for {}",
                symbol
            )));
        }
        Ok(bars)
    }
}

async fn fetch_daily(client: &reqwest::Client, symbol: &str) -> Result<Vec<Bar>> {
    let url = format!(
        "{}/{}?range={}&interval=1d",
        CHART_URL, symbol, LOOKBACK
    );
    let response = client.get(&url).send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(TradingError::NoBarsForSymbol(symbol.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TradingError::BrokerError(format!(
            "Yahoo chart API error for {}: {} - {}",
            symbol, status, body
        )));
    }
    let payload: ChartResponse = response.json().await?;
    bars_from_chart(symbol, payload)
}

/// Convert one chart payload into validated bars, oldest to newest
///
/// Rows with missing fields (halted sessions, partial data) are dropped
/// rather than failing the whole series.
fn bars_from_chart(symbol: &str, payload: ChartResponse) -> Result<Vec<Bar>> {
    if let Some(error) = payload.chart.error {
        return Err(TradingError::NoBarsForSymbol(format!(
            "{}: {}",
            symbol, error.description
        )));
    }
    let result = payload
        .chart
        .result
        .and_then(|mut results| if results.is_empty() { None } else { Some(results.remove(0)) })
        .ok_or_else(|| TradingError::NoBarsForSymbol(symbol.to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    let mut dropped = 0usize;
    for (index, unix) in timestamps.iter().enumerate() {
        match build_bar(&quote, index, *unix) {
            Some(bar) => bars.push(bar),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("{}: dropped {} incomplete daily rows", symbol, dropped);
    }
    if bars.is_empty() {
        return Err(TradingError::InsufficientBars(format!(
            "Yahoo returned no usable daily bars for {}",
            symbol
        )));
    }
    Ok(bars)
}

fn build_bar(quote: &Quote, index: usize, unix: i64) -> Option<Bar> {
    let open = decimal_at(&quote.open, index)?;
    let high = decimal_at(&quote.high, index)?;
    let low = decimal_at(&quote.low, index)?;
    let close = decimal_at(&quote.close, index)?;
    let volume = *quote.volume.get(index)?.as_ref()?;

    let timestamp: DateTime<Utc> = DateTime::from_timestamp(unix, 0)?;
    let trading_datetime = TradingDateTime::from_utc(timestamp).ok()?;
    Bar::new(
        trading_datetime,
        Money::usd(open),
        Money::usd(high),
        Money::usd(low),
        Money::usd(close),
        volume,
    )
    .ok()
}

fn decimal_at(values: &[Option<f64>], index: usize) -> Option<Decimal> {
    let value = (*values.get(index)?)?;
    Decimal::from_f64_retain(value).map(|d| d.round_dp(6))
}

#[async_trait]
impl BarSource for YahooBarSource {
    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.watchlist.clone())
    }

    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        Ok(self.cached(symbol)?.clone())
    }

    async fn current_bar(&self, symbol: &str) -> Result<Bar> {
        let bars = self.cached(symbol)?;
        Ok(bars[bars.len() - 1].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // 2025-01-06 (Mon) and 2025-01-07 (Tue), midday UTC
    const MONDAY_TS: i64 = 1736164800;
    const TUESDAY_TS: i64 = 1736251200;

    fn payload(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_chart_payload_to_bars() {
        let json = format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{},{}],
                "indicators":{{"quote":[{{
                    "open":[100.0,101.5],"high":[102.0,103.0],
                    "low":[99.0,100.5],"close":[101.0,102.25],
                    "volume":[1000000,1100000]}}]}}}}],"error":null}}}}"#,
            MONDAY_TS, TUESDAY_TS
        );
        let bars = bars_from_chart("AAPL", payload(&json)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close().amount, dec!(101));
        assert_eq!(bars[1].volume(), 1_100_000);
    }

    #[test]
    fn test_incomplete_rows_are_dropped() {
        let json = format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{},{}],
                "indicators":{{"quote":[{{
                    "open":[100.0,null],"high":[102.0,103.0],
                    "low":[99.0,100.5],"close":[101.0,102.25],
                    "volume":[1000000,1100000]}}]}}}}],"error":null}}}}"#,
            MONDAY_TS, TUESDAY_TS
        );
        let bars = bars_from_chart("AAPL", payload(&json)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close().amount, dec!(101));
    }

    #[test]
    fn test_chart_error_is_no_bars() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(matches!(
            bars_from_chart("NOPE", payload(json)),
            Err(TradingError::NoBarsForSymbol(_))
        ));
    }

    #[test]
    fn test_all_rows_unusable_is_insufficient() {
        let json = format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{}],
                "indicators":{{"quote":[{{
                    "open":[null],"high":[null],"low":[null],"close":[null],
                    "volume":[null]}}]}}}}],"error":null}}}}"#,
            MONDAY_TS
        );
        assert!(matches!(
            bars_from_chart("AAPL", payload(&json)),
            Err(TradingError::InsufficientBars(_))
        ));
    }
}
