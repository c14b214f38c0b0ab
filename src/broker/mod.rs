/// Broker core: state, staleness discipline, order admission
pub mod alpaca;
pub mod mock;
pub mod models;
pub mod pdt;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{Result, TradingError};
use crate::telemetry::{Observer, SpanStatus};
use crate::types::{Money, TradingDateTime};

pub use alpaca::AlpacaBackend;
pub use mock::{MockBackend, PlacedOrder};
pub use models::{
    AccountState, Order, OrderSide, OrderSize, OrderStatus, OrderType, Position, PositionSide,
};
pub use pdt::{PdtContext, PdtDecision, PdtPolicy};

use models::BrokerState;

/// State older than this is refreshed before the next read or write
const STALE_AFTER_MINUTES: i64 = 10;

/// The primitives a concrete brokerage must supply
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Re-populate account state from the world
    async fn refresh(&mut self) -> Result<AccountState>;

    /// Physically place an order; admission has already happened
    async fn place_order(&mut self, symbol: &str, side: OrderSide, size: &OrderSize)
        -> Result<()>;

    /// Cancel every outstanding order
    async fn cancel_all_orders(&mut self) -> Result<()>;

    /// Whether a position in this symbol was opened today
    async fn position_opened_today(&self, symbol: &str) -> Result<bool>;
}

/// Broker front: owns the account state, enforces freshness, and runs
/// every order through the active PDT policy before the backend sees it
pub struct Broker {
    backend: Box<dyn BrokerBackend>,
    policy: PdtPolicy,
    state: BrokerState,
    observer: Arc<dyn Observer>,
}

impl Broker {
    pub fn new(backend: Box<dyn BrokerBackend>, policy: PdtPolicy, observer: Arc<dyn Observer>) -> Self {
        Broker {
            backend,
            policy,
            state: BrokerState::new(),
            observer,
        }
    }

    pub fn policy(&self) -> PdtPolicy {
        self.policy
    }

    /// Refresh state when it is flagged stale or past the staleness window
    async fn ensure_fresh(&mut self) -> Result<()> {
        let now = TradingDateTime::now();
        let age = now.timestamp() - self.state.updated_at().timestamp();
        if !self.state.is_stale() && age <= Duration::minutes(STALE_AFTER_MINUTES) {
            return Ok(());
        }

        let mut span = self.observer.start_span("broker.refresh");
        span.set_attribute("backend", self.backend.name());
        // Stay stale until the refresh is proven good, so a failed
        // attempt is retried on the next call instead of serving
        // cleared fields
        self.state.mark_stale();
        self.state.clear();
        match self.backend.refresh().await {
            Ok(account) => {
                self.state.apply(account, now);
                if let Err(e) = self.state.ensure_in_good_order() {
                    self.state.mark_stale();
                    span.record_error(&e);
                    span.set_status(SpanStatus::Error);
                    return Err(e);
                }
                span.set_status(SpanStatus::Ok);
                debug!("Broker state refreshed via {}", self.backend.name());
                Ok(())
            }
            Err(e) => {
                span.record_error(&e);
                span.set_status(SpanStatus::Error);
                Err(e)
            }
        }
    }

    pub async fn available_cash(&mut self) -> Result<Money> {
        self.ensure_fresh().await?;
        Ok(self.state.cash()?.clone())
    }

    pub async fn equity(&mut self) -> Result<Money> {
        self.ensure_fresh().await?;
        Ok(self.state.equity()?.clone())
    }

    pub async fn day_trade_count(&mut self) -> Result<u32> {
        self.ensure_fresh().await?;
        self.state.day_trade_count()
    }

    pub async fn positions(&mut self) -> Result<Vec<Position>> {
        self.ensure_fresh().await?;
        Ok(self.state.positions()?.values().cloned().collect())
    }

    pub async fn position(&mut self, symbol: &str) -> Result<Option<Position>> {
        self.ensure_fresh().await?;
        Ok(self.state.positions()?.get(symbol).cloned())
    }

    /// Book cost over equity, zero when equity is zero
    pub async fn account_exposure(&mut self) -> Result<Decimal> {
        self.ensure_fresh().await?;
        let equity = self.state.equity()?.amount;
        if equity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let book_cost: Decimal = self
            .state
            .positions()?
            .values()
            .filter_map(|p| p.average_cost().map(|cost| p.size() * cost.amount))
            .sum();
        Ok(book_cost / equity)
    }

    /// One symbol's cost over equity, zero when flat or equity is zero
    pub async fn position_exposure(&mut self, symbol: &str) -> Result<Decimal> {
        self.ensure_fresh().await?;
        let equity = self.state.equity()?.amount;
        if equity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let exposure = self
            .state
            .positions()?
            .get(symbol)
            .and_then(|p| p.average_cost().map(|cost| p.size() * cost.amount / equity))
            .unwrap_or(Decimal::ZERO);
        Ok(exposure)
    }

    /// Full admission pipeline: refresh, PDT check, dispatch, mark stale
    pub async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: OrderSize,
    ) -> Result<()> {
        self.ensure_fresh().await?;
        let mut span = self.observer.start_span("broker.place_order");
        span.set_attribute("symbol", symbol);
        span.set_attribute("side", side.as_str());

        let context = self.build_pdt_context(symbol, side, &size).await?;
        let decision = self.policy.evaluate(&context)?;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "order rejected by PDT policy".to_string());
            let error = TradingError::PdtRuleViolation(reason);
            span.record_error(&error);
            span.set_status(SpanStatus::Error);
            return Err(error);
        }

        self.backend.place_order(symbol, side, &size).await?;
        self.state.mark_stale();
        span.set_status(SpanStatus::Ok);
        info!(
            "Order dispatched: {} {} via {} [{}]",
            side.as_str(),
            symbol,
            self.backend.name(),
            self.policy.name()
        );
        Ok(())
    }

    pub async fn cancel_all_orders(&mut self) -> Result<()> {
        self.ensure_fresh().await?;
        self.backend.cancel_all_orders().await?;
        self.state.mark_stale();
        info!("Cancelled all outstanding orders via {}", self.backend.name());
        Ok(())
    }

    async fn build_pdt_context(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: &OrderSize,
    ) -> Result<PdtContext> {
        let mut context = PdtContext::new(symbol, side);
        context.amount = size.notional().cloned();
        context.rolling_day_trade_count = self.state.day_trade_count()?;
        context.equity = Some(self.state.equity()?.clone());
        context.broker_name = Some(self.backend.name().to_string());

        match side {
            OrderSide::Buy => {
                let symbols: Vec<String> =
                    self.state.positions()?.keys().cloned().collect();
                let mut opened_today = 0u32;
                for position_symbol in symbols {
                    if self.backend.position_opened_today(&position_symbol).await? {
                        opened_today += 1;
                    }
                }
                context.positions_opened_today = opened_today;
            }
            OrderSide::Sell => {
                if self.state.positions()?.get(symbol).is_none() {
                    return Err(TradingError::BrokerError(format!(
                        "Cannot sell {}: no position exists",
                        symbol
                    )));
                }
                context.position_opened_today =
                    self.backend.position_opened_today(symbol).await?;
            }
        }
        Ok(context)
    }
}
