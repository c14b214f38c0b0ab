/// Broker-side data model: orders, positions, account state
use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

/// Trade side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Order type; only market orders are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &str {
        match self {
            OrderType::Market => "MARKET",
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    PartialFill,
    Cancelled,
    Rejected,
}

/// Position side derived from net quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// Requested order size: notional dollars or a share quantity, never both
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSize {
    Notional(Money),
    Quantity(Decimal),
}

impl OrderSize {
    pub fn notional(&self) -> Option<&Money> {
        match self {
            OrderSize::Notional(amount) => Some(amount),
            OrderSize::Quantity(_) => None,
        }
    }

    pub fn quantity(&self) -> Option<Decimal> {
        match self {
            OrderSize::Notional(_) => None,
            OrderSize::Quantity(quantity) => Some(*quantity),
        }
    }
}

/// A trade order and its fill lifecycle
///
/// Exactly one of `dollar_amount` / `quantity_requested` is set, fixed at
/// construction via `OrderSize`. Status transitions go through the
/// validating methods below; an `Order` in hand always satisfies its
/// status invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: String,
    symbol: String,
    dollar_amount: Option<Money>,
    quantity_requested: Option<Decimal>,
    quantity_filled: Decimal,
    side: OrderSide,
    order_type: OrderType,
    status: OrderStatus,
    avg_fill_price: Option<Money>,
    created_at: TradingDateTime,
    filled_at: Option<TradingDateTime>,
}

impl Order {
    pub fn pending(
        symbol: &str,
        side: OrderSide,
        size: OrderSize,
        created_at: TradingDateTime,
    ) -> Self {
        let (dollar_amount, quantity_requested) = match size {
            OrderSize::Notional(amount) => (Some(amount), None),
            OrderSize::Quantity(quantity) => (None, Some(quantity)),
        };
        Order {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            dollar_amount,
            quantity_requested,
            quantity_filled: Decimal::ZERO,
            side,
            order_type: OrderType::Market,
            status: OrderStatus::Pending,
            avg_fill_price: None,
            created_at,
            filled_at: None,
        }
    }

    /// Mark fully filled
    pub fn fill(
        mut self,
        avg_fill_price: Money,
        quantity_filled: Decimal,
        filled_at: TradingDateTime,
    ) -> Result<Self> {
        if self.status != OrderStatus::Pending {
            return Err(TradingError::InvalidOrder(format!(
                "cannot fill order in status {:?}",
                self.status
            )));
        }
        if quantity_filled <= Decimal::ZERO {
            return Err(TradingError::InvalidOrder(
                "filled quantity must be positive".to_string(),
            ));
        }
        if let Some(requested) = self.quantity_requested {
            if quantity_filled != requested {
                return Err(TradingError::InvalidOrder(format!(
                    "filled {} but requested {}",
                    quantity_filled, requested
                )));
            }
        }
        self.status = OrderStatus::Filled;
        self.avg_fill_price = Some(avg_fill_price);
        self.quantity_filled = quantity_filled;
        self.filled_at = Some(filled_at);
        Ok(self)
    }

    /// Mark partially filled; requires a quantity-based order
    pub fn fill_partial(
        mut self,
        avg_fill_price: Money,
        quantity_filled: Decimal,
        filled_at: TradingDateTime,
    ) -> Result<Self> {
        if self.status != OrderStatus::Pending {
            return Err(TradingError::InvalidOrder(format!(
                "cannot fill order in status {:?}",
                self.status
            )));
        }
        let requested = self.quantity_requested.ok_or_else(|| {
            TradingError::InvalidOrder(
                "partial fill requires a quantity-based order".to_string(),
            )
        })?;
        if quantity_filled <= Decimal::ZERO || quantity_filled >= requested {
            return Err(TradingError::InvalidOrder(format!(
                "partial fill of {} must be strictly between 0 and {}",
                quantity_filled, requested
            )));
        }
        self.status = OrderStatus::PartialFill;
        self.avg_fill_price = Some(avg_fill_price);
        self.quantity_filled = quantity_filled;
        self.filled_at = Some(filled_at);
        Ok(self)
    }

    pub fn cancel(mut self) -> Self {
        self.status = OrderStatus::Cancelled;
        self
    }

    /// Signed filled quantity: positive for buys, negative for sells
    pub fn net_quantity(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.quantity_filled,
            OrderSide::Sell => -self.quantity_filled,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn dollar_amount(&self) -> Option<&Money> {
        self.dollar_amount.as_ref()
    }

    pub fn quantity_requested(&self) -> Option<Decimal> {
        self.quantity_requested
    }

    pub fn quantity_filled(&self) -> Decimal {
        self.quantity_filled
    }

    pub fn avg_fill_price(&self) -> Option<&Money> {
        self.avg_fill_price.as_ref()
    }

    pub fn created_at(&self) -> &TradingDateTime {
        &self.created_at
    }

    pub fn filled_at(&self) -> Option<&TradingDateTime> {
        self.filled_at.as_ref()
    }
}

/// An open position: the order flow for one symbol
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Position {
    symbol: String,
    orders: Vec<Order>,
}

impl Position {
    pub fn new(symbol: &str) -> Self {
        Position {
            symbol: symbol.to_string(),
            orders: Vec::new(),
        }
    }

    /// Build from a broker-reported aggregate (quantity + average cost)
    /// by synthesizing the single fill that would produce it
    pub fn from_holding(
        symbol: &str,
        quantity: Decimal,
        average_cost: Money,
        as_of: TradingDateTime,
    ) -> Result<Self> {
        let side = if quantity >= Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let order = Order::pending(symbol, side, OrderSize::Quantity(quantity.abs()), as_of)
            .fill(average_cost, quantity.abs(), as_of)?;
        Ok(Position {
            symbol: symbol.to_string(),
            orders: vec![order],
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn push_order(&mut self, order: Order) {
        self.orders.push(order);
    }

    /// Net size across all orders; zero when there are no orders
    pub fn size(&self) -> Decimal {
        self.orders.iter().map(Order::net_quantity).sum()
    }

    pub fn side(&self) -> PositionSide {
        if self.size() > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    /// Fill-weighted average cost; `None` for a flat position
    pub fn average_cost(&self) -> Option<Money> {
        let size = self.size();
        if size.is_zero() {
            return None;
        }
        let weighted: Decimal = self
            .orders
            .iter()
            .filter_map(|o| o.avg_fill_price().map(|p| o.net_quantity() * p.amount))
            .sum();
        Some(Money::usd(weighted / size))
    }

    /// Gross market value of the filled order flow
    pub fn market_value(&self) -> Money {
        let total: Decimal = self
            .orders
            .iter()
            .filter_map(|o| {
                o.avg_fill_price()
                    .map(|p| o.net_quantity().abs() * p.amount)
            })
            .sum();
        Money::usd(total)
    }
}

/// Snapshot a backend hands back from a refresh
#[derive(Debug, Clone)]
pub struct AccountState {
    pub cash: Money,
    pub equity: Money,
    pub positions: HashMap<String, Position>,
    pub day_trade_count: u32,
}

/// The broker core's private state
///
/// Fields are option-valued so the staleness handler can clear them all,
/// re-populate from the backend, and then prove the result is in good
/// order before anything reads it.
#[derive(Debug)]
pub(crate) struct BrokerState {
    cash: Option<Money>,
    equity: Option<Money>,
    positions: Option<HashMap<String, Position>>,
    day_trade_count: Option<u32>,
    updated_at: TradingDateTime,
    is_stale: bool,
}

impl BrokerState {
    pub fn new() -> Self {
        BrokerState {
            cash: None,
            equity: None,
            positions: None,
            day_trade_count: None,
            updated_at: TradingDateTime::now(),
            is_stale: true,
        }
    }

    pub fn clear(&mut self) {
        self.cash = None;
        self.equity = None;
        self.positions = None;
        self.day_trade_count = None;
    }

    pub fn apply(&mut self, account: AccountState, now: TradingDateTime) {
        self.cash = Some(account.cash);
        self.equity = Some(account.equity);
        self.positions = Some(account.positions);
        self.day_trade_count = Some(account.day_trade_count);
        self.updated_at = now;
        self.is_stale = false;
    }

    pub fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn updated_at(&self) -> &TradingDateTime {
        &self.updated_at
    }

    /// Fail unless every field survived the refresh and each position is
    /// keyed by its own symbol
    pub fn ensure_in_good_order(&self) -> Result<()> {
        if self.cash.is_none() {
            return Err(TradingError::BrokerError(
                "state not in good order: cash missing after refresh".to_string(),
            ));
        }
        if self.equity.is_none() {
            return Err(TradingError::BrokerError(
                "state not in good order: equity missing after refresh".to_string(),
            ));
        }
        if self.day_trade_count.is_none() {
            return Err(TradingError::BrokerError(
                "state not in good order: day trade count missing after refresh".to_string(),
            ));
        }
        match &self.positions {
            None => Err(TradingError::BrokerError(
                "state not in good order: positions missing after refresh".to_string(),
            )),
            Some(positions) => {
                for (symbol, position) in positions {
                    if position.symbol() != symbol {
                        return Err(TradingError::BrokerError(format!(
                            "state not in good order: position for {} keyed as {}",
                            position.symbol(),
                            symbol
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    pub fn cash(&self) -> Result<&Money> {
        self.cash
            .as_ref()
            .ok_or_else(|| TradingError::BrokerError("cash not loaded".to_string()))
    }

    pub fn equity(&self) -> Result<&Money> {
        self.equity
            .as_ref()
            .ok_or_else(|| TradingError::BrokerError("equity not loaded".to_string()))
    }

    pub fn positions(&self) -> Result<&HashMap<String, Position>> {
        self.positions
            .as_ref()
            .ok_or_else(|| TradingError::BrokerError("positions not loaded".to_string()))
    }

    pub fn day_trade_count(&self) -> Result<u32> {
        self.day_trade_count
            .ok_or_else(|| TradingError::BrokerError("day trade count not loaded".to_string()))
    }
}
