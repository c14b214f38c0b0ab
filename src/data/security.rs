/// Tradable security with indicator queries over its bar history
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::bar::Bar;
use crate::error::{Result, TradingError};
use crate::types::{Money, Timeframe};

/// A symbol plus its current bar and daily history, oldest to newest
///
/// Indicator queries return `Ok(None)` when the history is too short;
/// intraday timeframes are rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    symbol: String,
    current_bar: Bar,
    bars: Vec<Bar>,
}

impl Security {
    pub fn new(symbol: String, current_bar: Bar, bars: Vec<Bar>) -> Self {
        Security {
            symbol,
            current_bar,
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn current_bar(&self) -> &Bar {
        &self.current_bar
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn current_price(&self) -> Money {
        self.current_bar.close().clone()
    }

    pub fn current_volume(&self) -> i64 {
        self.current_bar.volume()
    }

    /// Arithmetic mean of close over the last `period` daily bars
    pub fn moving_average(&self, period: Timeframe) -> Result<Option<Money>> {
        let days = self.daily_window(period)?;
        Ok(self.window_mean_close(days, 0))
    }

    /// Floor-mean of volume over the last `period` daily bars
    pub fn average_volume(&self, period: Timeframe) -> Result<Option<i64>> {
        let days = self.daily_window(period)?;
        if self.bars.len() < days {
            return Ok(None);
        }
        let sum: i64 = self.bars[self.bars.len() - days..]
            .iter()
            .map(Bar::volume)
            .sum();
        Ok(Some(sum / days as i64))
    }

    /// True iff the short MA was strictly below the long MA yesterday and
    /// strictly above it today
    pub fn bullish_crossover(&self, short: Timeframe, long: Timeframe) -> Result<bool> {
        let short_days = self.daily_window(short)?;
        let long_days = self.daily_window(long)?;
        let (short_today, long_today, short_yesterday, long_yesterday) = match (
            self.window_mean_close(short_days, 0),
            self.window_mean_close(long_days, 0),
            self.window_mean_close(short_days, 1),
            self.window_mean_close(long_days, 1),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Ok(false),
        };
        Ok(short_yesterday.amount < long_yesterday.amount
            && short_today.amount > long_today.amount)
    }

    /// True iff the short MA was strictly above the long MA yesterday and
    /// strictly below it today
    pub fn bearish_crossover(&self, short: Timeframe, long: Timeframe) -> Result<bool> {
        let short_days = self.daily_window(short)?;
        let long_days = self.daily_window(long)?;
        let (short_today, long_today, short_yesterday, long_yesterday) = match (
            self.window_mean_close(short_days, 0),
            self.window_mean_close(long_days, 0),
            self.window_mean_close(short_days, 1),
            self.window_mean_close(long_days, 1),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Ok(false),
        };
        Ok(short_yesterday.amount > long_yesterday.amount
            && short_today.amount < long_today.amount)
    }

    fn daily_window(&self, period: Timeframe) -> Result<usize> {
        if period.is_intraday() {
            return Err(TradingError::InsufficientBars(format!(
                "intraday timeframe {} not supported for daily indicators",
                period
            )));
        }
        Ok(period.to_days())
    }

    /// Mean close over a window of `days` bars ending `offset` bars back
    fn window_mean_close(&self, days: usize, offset: usize) -> Option<Money> {
        if days == 0 || self.bars.len() < days + offset {
            return None;
        }
        let end = self.bars.len() - offset;
        let sum: Decimal = self.bars[end - days..end]
            .iter()
            .map(|b| b.close().amount)
            .sum();
        Some(Money::usd(sum / Decimal::from(days as u64)))
    }
}
