/// Validated OHLCV bar
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

/// One OHLCV summary over a fixed timeframe
///
/// Construction enforces the price envelope: `low <= open/close <= high`
/// and a non-negative volume. A `Bar` that exists is a valid bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    trading_datetime: TradingDateTime,
    open: Money,
    high: Money,
    low: Money,
    close: Money,
    volume: i64,
}

impl Bar {
    pub fn new(
        trading_datetime: TradingDateTime,
        open: Money,
        high: Money,
        low: Money,
        close: Money,
        volume: i64,
    ) -> Result<Self> {
        if low.amount > high.amount {
            return Err(TradingError::BarValidation(format!(
                "low {} must be less than or equal to high {}",
                low, high
            )));
        }
        if open.amount < low.amount || open.amount > high.amount {
            return Err(TradingError::BarValidation(format!(
                "open {} must be between low {} and high {}",
                open, low, high
            )));
        }
        if close.amount < low.amount || close.amount > high.amount {
            return Err(TradingError::BarValidation(format!(
                "close {} must be between low {} and high {}",
                close, low, high
            )));
        }
        if volume < 0 {
            return Err(TradingError::BarValidation(format!(
                "volume cannot be negative, got {}",
                volume
            )));
        }
        Ok(Bar {
            trading_datetime,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn trading_datetime(&self) -> &TradingDateTime {
        &self.trading_datetime
    }

    pub fn open(&self) -> &Money {
        &self.open
    }

    pub fn high(&self) -> &Money {
        &self.high
    }

    pub fn low(&self) -> &Money {
        &self.low
    }

    pub fn close(&self) -> &Money {
        &self.close
    }

    pub fn volume(&self) -> i64 {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn monday() -> TradingDateTime {
        TradingDateTime::from_daily_close(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()).unwrap()
    }

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: i64) -> Result<Bar> {
        Bar::new(
            monday(),
            Money::usd(open),
            Money::usd(high),
            Money::usd(low),
            Money::usd(close),
            volume,
        )
    }

    #[test]
    fn test_valid_bar() {
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103), 50_000).unwrap();
        assert!(b.low().amount <= b.open().amount && b.open().amount <= b.high().amount);
        assert!(b.low().amount <= b.close().amount && b.close().amount <= b.high().amount);
        assert!(b.volume() >= 0);
    }

    #[test]
    fn test_low_above_high_rejected() {
        assert!(matches!(
            bar(dec!(100), dec!(98), dec!(105), dec!(100), 1),
            Err(TradingError::BarValidation(_))
        ));
    }

    #[test]
    fn test_open_outside_envelope_rejected() {
        assert!(bar(dec!(110), dec!(105), dec!(98), dec!(103), 1).is_err());
    }

    #[test]
    fn test_close_outside_envelope_rejected() {
        assert!(bar(dec!(100), dec!(105), dec!(98), dec!(96), 1).is_err());
    }

    #[test]
    fn test_negative_volume_rejected() {
        assert!(bar(dec!(100), dec!(105), dec!(98), dec!(103), -5).is_err());
    }
}
