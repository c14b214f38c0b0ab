/// Per-symbol evaluation context fed to the DSL evaluator
use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Security;
use crate::error::Result;
use crate::types::{Money, Timeframe};

/// The closed set of names a strategy may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextIdentifier {
    Ma5,
    Ma20,
    Ma50,
    Ma100,
    Ma200,
    Av5,
    Av20,
    Av50,
    Av100,
    Av200,
    CurrentVolume,
    CurrentPrice,
    AccountExposure,
    OpenPositions,
    AvailableCash,
    AverageCost,
}

impl ContextIdentifier {
    pub const ALL: [ContextIdentifier; 16] = [
        ContextIdentifier::Ma5,
        ContextIdentifier::Ma20,
        ContextIdentifier::Ma50,
        ContextIdentifier::Ma100,
        ContextIdentifier::Ma200,
        ContextIdentifier::Av5,
        ContextIdentifier::Av20,
        ContextIdentifier::Av50,
        ContextIdentifier::Av100,
        ContextIdentifier::Av200,
        ContextIdentifier::CurrentVolume,
        ContextIdentifier::CurrentPrice,
        ContextIdentifier::AccountExposure,
        ContextIdentifier::OpenPositions,
        ContextIdentifier::AvailableCash,
        ContextIdentifier::AverageCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextIdentifier::Ma5 => "MA5",
            ContextIdentifier::Ma20 => "MA20",
            ContextIdentifier::Ma50 => "MA50",
            ContextIdentifier::Ma100 => "MA100",
            ContextIdentifier::Ma200 => "MA200",
            ContextIdentifier::Av5 => "AV5",
            ContextIdentifier::Av20 => "AV20",
            ContextIdentifier::Av50 => "AV50",
            ContextIdentifier::Av100 => "AV100",
            ContextIdentifier::Av200 => "AV200",
            ContextIdentifier::CurrentVolume => "CURRENT_VOLUME",
            ContextIdentifier::CurrentPrice => "CURRENT_PRICE",
            ContextIdentifier::AccountExposure => "ACCOUNT_EXPOSURE",
            ContextIdentifier::OpenPositions => "OPEN_POSITIONS",
            ContextIdentifier::AvailableCash => "AVAILABLE_CASH",
            ContextIdentifier::AverageCost => "AVERAGE_COST",
        }
    }

    /// Resolve a source-level identifier, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.iter().copied().find(|id| id.as_str() == upper)
    }

    pub fn is_moving_average(&self) -> bool {
        self.moving_average_timeframe().is_some()
    }

    /// The lookback for MA identifiers, `None` otherwise
    pub fn moving_average_timeframe(&self) -> Option<Timeframe> {
        match self {
            ContextIdentifier::Ma5 => Some(Timeframe::D5),
            ContextIdentifier::Ma20 => Some(Timeframe::D20),
            ContextIdentifier::Ma50 => Some(Timeframe::D50),
            ContextIdentifier::Ma100 => Some(Timeframe::D100),
            ContextIdentifier::Ma200 => Some(Timeframe::D200),
            _ => None,
        }
    }

    /// The lookback for AV identifiers, `None` otherwise
    pub fn average_volume_timeframe(&self) -> Option<Timeframe> {
        match self {
            ContextIdentifier::Av5 => Some(Timeframe::D5),
            ContextIdentifier::Av20 => Some(Timeframe::D20),
            ContextIdentifier::Av50 => Some(Timeframe::D50),
            ContextIdentifier::Av100 => Some(Timeframe::D100),
            ContextIdentifier::Av200 => Some(Timeframe::D200),
            _ => None,
        }
    }
}

impl fmt::Display for ContextIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value bound to a context identifier
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Money(Money),
    Decimal(Decimal),
    Int(i64),
}

impl ContextValue {
    /// Numeric view used by the evaluator; Money exposes its amount
    pub fn as_decimal(&self) -> Decimal {
        match self {
            ContextValue::Money(money) => money.amount,
            ContextValue::Decimal(value) => *value,
            ContextValue::Int(value) => Decimal::from(*value),
        }
    }
}

/// Broker-side numbers the context builder folds in per symbol
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account_exposure: Decimal,
    pub open_positions: usize,
    pub available_cash: Money,
    pub average_cost: Option<Money>,
}

/// Flat record keyed by `ContextIdentifier`, built once per symbol and
/// discarded at the end of that symbol's iteration
#[derive(Debug, Clone, Default)]
pub struct StrategyContext {
    values: HashMap<ContextIdentifier, ContextValue>,
}

impl StrategyContext {
    pub fn new() -> Self {
        StrategyContext {
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: ContextIdentifier, value: ContextValue) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: ContextIdentifier) -> Option<&ContextValue> {
        self.values.get(&id)
    }

    /// Populate indicator, account, and position fields for one security
    ///
    /// Indicators with too little history stay absent rather than zero, so
    /// strategies referencing them fail with a missing-value error instead
    /// of silently comparing against nothing.
    pub fn for_security(security: &Security, account: &AccountSnapshot) -> Result<Self> {
        let mut context = StrategyContext::new();

        for id in ContextIdentifier::ALL {
            if let Some(timeframe) = id.moving_average_timeframe() {
                if let Some(value) = security.moving_average(timeframe)? {
                    context.insert(id, ContextValue::Money(value));
                }
            } else if let Some(timeframe) = id.average_volume_timeframe() {
                if let Some(value) = security.average_volume(timeframe)? {
                    context.insert(id, ContextValue::Int(value));
                }
            }
        }

        context.insert(
            ContextIdentifier::CurrentPrice,
            ContextValue::Money(security.current_price()),
        );
        context.insert(
            ContextIdentifier::CurrentVolume,
            ContextValue::Int(security.current_volume()),
        );
        context.insert(
            ContextIdentifier::AccountExposure,
            ContextValue::Decimal(account.account_exposure),
        );
        context.insert(
            ContextIdentifier::OpenPositions,
            ContextValue::Int(account.open_positions as i64),
        );
        context.insert(
            ContextIdentifier::AvailableCash,
            ContextValue::Money(account.available_cash.clone()),
        );
        if let Some(average_cost) = &account.average_cost {
            context.insert(
                ContextIdentifier::AverageCost,
                ContextValue::Money(average_cost.clone()),
            );
        }

        Ok(context)
    }
}
