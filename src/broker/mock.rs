/// Mock brokerage backend (simulation mode)
///
/// Orders queue as pending and fill on the next refresh at a configured
/// per-symbol price, which mirrors how the live flow observes its own
/// fills: place, go stale, refresh, see the position.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::broker::models::{AccountState, Order, OrderSide, OrderSize, Position};
use crate::broker::BrokerBackend;
use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

/// A dispatch recorded for later inspection
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub size: OrderSize,
}

pub struct MockBackend {
    cash: Money,
    day_trade_count: u32,
    positions: HashMap<String, Position>,
    pending_orders: Vec<Order>,
    fill_prices: HashMap<String, Money>,
    default_fill_price: Money,
    opened_today: HashSet<String>,
    refresh_count: Arc<RwLock<u32>>,
    order_log: Arc<RwLock<Vec<PlacedOrder>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            cash: Money::usd(Decimal::from(100_000)),
            day_trade_count: 0,
            positions: HashMap::new(),
            pending_orders: Vec::new(),
            fill_prices: HashMap::new(),
            default_fill_price: Money::usd(Decimal::from(100)),
            opened_today: HashSet::new(),
            refresh_count: Arc::new(RwLock::new(0)),
            order_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_cash(mut self, cash: Money) -> Self {
        self.cash = cash;
        self
    }

    pub fn with_day_trade_count(mut self, count: u32) -> Self {
        self.day_trade_count = count;
        self
    }

    pub fn with_fill_price(mut self, symbol: &str, price: Money) -> Self {
        self.fill_prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_position(mut self, symbol: &str, quantity: Decimal, average_cost: Money) -> Self {
        let position =
            Position::from_holding(symbol, quantity, average_cost, TradingDateTime::now())
                .expect("seed position is valid");
        self.positions.insert(symbol.to_string(), position);
        self
    }

    pub fn with_position_opened_today(mut self, symbol: &str) -> Self {
        self.opened_today.insert(symbol.to_string());
        self
    }

    /// Handle onto the refresh counter, for asserting refresh discipline
    pub fn refresh_count(&self) -> Arc<RwLock<u32>> {
        Arc::clone(&self.refresh_count)
    }

    /// Handle onto the dispatch log, for asserting placements
    pub fn order_log(&self) -> Arc<RwLock<Vec<PlacedOrder>>> {
        Arc::clone(&self.order_log)
    }

    fn fill_price_for(&self, symbol: &str) -> Money {
        self.fill_prices
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.default_fill_price.clone())
    }

    fn settle_pending(&mut self) -> Result<()> {
        let pending: Vec<Order> = self.pending_orders.drain(..).collect();
        for order in pending {
            let price = self.fill_price_for(order.symbol());
            if price.amount.is_zero() {
                return Err(TradingError::BrokerError(format!(
                    "no fill price for {}",
                    order.symbol()
                )));
            }
            let quantity = match order.quantity_requested() {
                Some(quantity) => quantity,
                None => match order.dollar_amount() {
                    Some(amount) => amount.amount / price.amount,
                    None => {
                        return Err(TradingError::BrokerError(
                            "order has neither quantity nor notional".to_string(),
                        ))
                    }
                },
            };
            let side = order.side();
            let symbol = order.symbol().to_string();
            let filled = order.fill(price.clone(), quantity, TradingDateTime::now())?;

            let cost = price.scaled(quantity);
            self.cash = match side {
                OrderSide::Buy => self.cash.checked_sub(&cost)?,
                OrderSide::Sell => self.cash.checked_add(&cost)?,
            };

            let position = self
                .positions
                .entry(symbol.clone())
                .or_insert_with(|| Position::new(&symbol));
            position.push_order(filled);
            if side == OrderSide::Buy {
                self.opened_today.insert(symbol);
            }
        }
        Ok(())
    }

    fn equity(&self) -> Result<Money> {
        let mut equity = self.cash.clone();
        for position in self.positions.values() {
            if let Some(cost) = position.average_cost() {
                equity = equity.checked_add(&cost.scaled(position.size()))?;
            }
        }
        Ok(equity)
    }
}

#[async_trait]
impl BrokerBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn refresh(&mut self) -> Result<AccountState> {
        *self.refresh_count.write().await += 1;
        self.settle_pending()?;
        // Flat positions drop out of the snapshot, the way a live
        // brokerage's positions endpoint omits them
        let positions: HashMap<String, Position> = self
            .positions
            .iter()
            .filter(|(_, p)| !p.size().is_zero())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(AccountState {
            cash: self.cash.clone(),
            equity: self.equity()?,
            positions,
            day_trade_count: self.day_trade_count,
        })
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: &OrderSize,
    ) -> Result<()> {
        self.pending_orders.push(Order::pending(
            symbol,
            side,
            size.clone(),
            TradingDateTime::now(),
        ));
        self.order_log.write().await.push(PlacedOrder {
            symbol: symbol.to_string(),
            side,
            size: size.clone(),
        });
        info!("[MOCK] Order queued: {} {} (simulated)", side.as_str(), symbol);
        Ok(())
    }

    async fn cancel_all_orders(&mut self) -> Result<()> {
        let dropped = self.pending_orders.len();
        self.pending_orders.clear();
        if dropped > 0 {
            info!("[MOCK] Cancelled {} pending orders (simulated)", dropped);
        }
        Ok(())
    }

    async fn position_opened_today(&self, symbol: &str) -> Result<bool> {
        Ok(self.opened_today.contains(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_pending_orders_fill_on_refresh() {
        let mut backend = MockBackend::new()
            .with_cash(Money::usd(dec!(10000)))
            .with_fill_price("AAPL", Money::usd(dec!(50)));

        backend
            .place_order(
                "AAPL",
                OrderSide::Buy,
                &OrderSize::Notional(Money::usd(dec!(1000))),
            )
            .await
            .unwrap();

        let account = backend.refresh().await.unwrap();
        assert_eq!(account.cash.amount, dec!(9000));
        let position = account.positions.get("AAPL").unwrap();
        assert_eq!(position.size(), dec!(20));
        assert!(backend.position_opened_today("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_drops_pending() {
        let mut backend = MockBackend::new().with_cash(Money::usd(dec!(10000)));
        backend
            .place_order(
                "AAPL",
                OrderSide::Buy,
                &OrderSize::Notional(Money::usd(dec!(1000))),
            )
            .await
            .unwrap();
        backend.cancel_all_orders().await.unwrap();

        let account = backend.refresh().await.unwrap();
        assert_eq!(account.cash.amount, dec!(10000));
        assert!(account.positions.is_empty());
    }

    #[tokio::test]
    async fn test_sell_returns_cash() {
        let mut backend = MockBackend::new()
            .with_cash(Money::usd(dec!(1000)))
            .with_position("AAPL", dec!(10), Money::usd(dec!(100)))
            .with_fill_price("AAPL", Money::usd(dec!(120)));

        backend
            .place_order("AAPL", OrderSide::Sell, &OrderSize::Quantity(dec!(10)))
            .await
            .unwrap();
        let account = backend.refresh().await.unwrap();
        assert_eq!(account.cash.amount, dec!(2200));
        assert!(account.positions.get("AAPL").is_none());
    }

    #[tokio::test]
    async fn test_equity_includes_book_value() {
        let mut backend = MockBackend::new()
            .with_cash(Money::usd(dec!(9000)))
            .with_position("AAPL", dec!(10), Money::usd(dec!(100)));
        let account = backend.refresh().await.unwrap();
        assert_eq!(account.equity.amount, dec!(10000));
    }
}
