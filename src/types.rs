/// Core value types: monetary amounts, market time, lookback timeframes
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};

/// Monetary amount paired with its currency
///
/// All monetary math runs on `Decimal`; binary floating point never
/// touches an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Money {
            amount,
            currency: currency.to_string(),
        }
    }

    /// Shorthand for USD amounts, the common case
    pub fn usd(amount: Decimal) -> Self {
        Money::new(amount, "USD")
    }

    pub fn zero(currency: &str) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    /// Add two amounts of the same currency
    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        if self.currency != other.currency {
            return Err(TradingError::CurrencyMismatch(format!(
                "cannot add {} and {}",
                self.currency, other.currency
            )));
        }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    /// Subtract an amount of the same currency
    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        if self.currency != other.currency {
            return Err(TradingError::CurrencyMismatch(format!(
                "cannot subtract {} from {}",
                other.currency, self.currency
            )));
        }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    /// Scale the amount by a dimensionless factor
    pub fn scaled(&self, factor: Decimal) -> Money {
        Money::new(self.amount * factor, &self.currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

/// A point in market time: the trading date plus the exact UTC instant
///
/// Constructors gate on weekdays; Saturday and Sunday are never valid
/// trading dates. `now()` reflects the wall clock and is the one
/// exception, so the broker staleness clock keeps working off-hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingDateTime {
    date: NaiveDate,
    timestamp: DateTime<Utc>,
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

impl TradingDateTime {
    /// Create from a trading date, timestamped at the last second of the day
    pub fn from_daily_close(date: NaiveDate) -> Result<Self> {
        if !is_weekday(date) {
            return Err(TradingError::InvalidTradingDate(format!(
                "{} is not a weekday",
                date
            )));
        }
        let close = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
            .expect("valid end-of-day time");
        Ok(TradingDateTime {
            date,
            timestamp: date.and_time(close).and_utc(),
        })
    }

    /// Create from a UTC timestamp
    pub fn from_utc(timestamp: DateTime<Utc>) -> Result<Self> {
        let date = timestamp.date_naive();
        if !is_weekday(date) {
            return Err(TradingError::InvalidTradingDate(format!(
                "{} is not a weekday",
                date
            )));
        }
        Ok(TradingDateTime { date, timestamp })
    }

    /// Current wall-clock time, not weekday-gated
    pub fn now() -> Self {
        let timestamp = Utc::now();
        TradingDateTime {
            date: timestamp.date_naive(),
            timestamp,
        }
    }

    /// Add a duration; fails if the result lands on a weekend
    pub fn checked_add(&self, delta: Duration) -> Result<Self> {
        let timestamp = self.timestamp + delta;
        let date = timestamp.date_naive();
        if !is_weekday(date) {
            return Err(TradingError::InvalidTradingDate(format!(
                "adding {} lands on {}, not a weekday",
                delta, date
            )));
        }
        Ok(TradingDateTime { date, timestamp })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for TradingDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} UTC]",
            self.date,
            self.timestamp.format("%H:%M:%S")
        )
    }
}

/// Lookback timeframes understood by the indicator queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    D1,
    D5,
    D20,
    D50,
    D100,
    D200,
}

impl Timeframe {
    pub fn to_days(&self) -> usize {
        match self {
            Timeframe::M15 => 0,
            Timeframe::D1 => 1,
            Timeframe::D5 => 5,
            Timeframe::D20 => 20,
            Timeframe::D50 => 50,
            Timeframe::D100 => 100,
            Timeframe::D200 => 200,
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self, Timeframe::M15)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::D1 => "1d",
            Timeframe::D5 => "5d",
            Timeframe::D20 => "20d",
            Timeframe::D50 => "50d",
            Timeframe::D100 => "100d",
            Timeframe::D200 => "200d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
