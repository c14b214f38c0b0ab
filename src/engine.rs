/// One-shot trading cycle
///
/// A single `execute()` call is one cycle: cancel outstanding orders,
/// materialize the watchlist, and for each security either exit an
/// existing position or consider a new entry. Symbols whose strategy
/// references a value the context could not supply are skipped for the
/// cycle; every other failure aborts it.
use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::{Broker, OrderSide, OrderSize};
use crate::data::{Security, SecurityProvider};
use crate::dsl::{AccountSnapshot, EvalContext, StrategyAst, StrategyContext};
use crate::error::Result;
use crate::telemetry::{Observer, SpanStatus};
use crate::types::Money;

/// What one cycle did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub orders_placed: u32,
    pub symbols_skipped: Vec<String>,
}

enum SymbolOutcome {
    OrderPlaced,
    Skipped,
    NoAction,
}

pub struct TradingEngine {
    strategy: StrategyAst,
    provider: SecurityProvider,
    broker: Broker,
    observer: Arc<dyn Observer>,
}

impl TradingEngine {
    pub fn new(
        strategy: StrategyAst,
        provider: SecurityProvider,
        broker: Broker,
        observer: Arc<dyn Observer>,
    ) -> Self {
        TradingEngine {
            strategy,
            provider,
            broker,
            observer,
        }
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    /// Run one trading cycle
    pub async fn execute(&mut self) -> Result<CycleReport> {
        let mut span = self.observer.start_span("engine.execute");
        span.set_attribute("strategy", &self.strategy.name);
        let mut report = CycleReport::default();

        self.broker.cancel_all_orders().await?;
        let securities = self.provider.securities().await?;
        info!(
            "Cycle start: strategy '{}' over {} securities",
            self.strategy.name,
            securities.len()
        );

        for security in &securities {
            match self.process_symbol(security).await {
                Ok(SymbolOutcome::OrderPlaced) => report.orders_placed += 1,
                Ok(SymbolOutcome::Skipped) => {
                    report.symbols_skipped.push(security.symbol().to_string());
                }
                Ok(SymbolOutcome::NoAction) => {}
                Err(e) => {
                    span.record_error(&e);
                    span.set_status(SpanStatus::Error);
                    return Err(e);
                }
            }
        }

        span.set_status(SpanStatus::Ok);
        info!(
            "Cycle complete: {} orders placed, {} symbols skipped",
            report.orders_placed,
            report.symbols_skipped.len()
        );
        Ok(report)
    }

    async fn process_symbol(&mut self, security: &Security) -> Result<SymbolOutcome> {
        let symbol = security.symbol();
        let snapshot = self.account_snapshot(symbol).await?;
        let context = StrategyContext::for_security(security, &snapshot)?;
        let eval = EvalContext::new(&context, security);

        let existing = self.broker.position(symbol).await?;
        if let Some(position) = existing {
            match self.strategy.evaluate_exit(&eval) {
                Err(e) if e.is_skippable() => {
                    warn!("Skipping {} this cycle: {}", symbol, e);
                    Ok(SymbolOutcome::Skipped)
                }
                Err(e) => Err(e),
                Ok(false) => Ok(SymbolOutcome::NoAction),
                Ok(true) => {
                    info!("Exit signal for {}", symbol);
                    self.broker
                        .place_order(symbol, OrderSide::Sell, OrderSize::Quantity(position.size()))
                        .await?;
                    Ok(SymbolOutcome::OrderPlaced)
                }
            }
        } else {
            match self.strategy.evaluate_entry(&eval) {
                Err(e) if e.is_skippable() => {
                    warn!("Skipping {} this cycle: {}", symbol, e);
                    Ok(SymbolOutcome::Skipped)
                }
                Err(e) => Err(e),
                Ok(false) => Ok(SymbolOutcome::NoAction),
                Ok(true) => {
                    let amount = self.strategy.evaluate_sizing(&eval)?;
                    info!("Entry signal for {}: sizing {}", symbol, amount);
                    self.broker
                        .place_order(
                            symbol,
                            OrderSide::Buy,
                            OrderSize::Notional(Money::usd(amount)),
                        )
                        .await?;
                    Ok(SymbolOutcome::OrderPlaced)
                }
            }
        }
    }

    async fn account_snapshot(&mut self, symbol: &str) -> Result<AccountSnapshot> {
        let account_exposure = self.broker.account_exposure().await?;
        let open_positions = self.broker.positions().await?.len();
        let available_cash = self.broker.available_cash().await?;
        let average_cost = self
            .broker
            .position(symbol)
            .await?
            .and_then(|p| p.average_cost());
        Ok(AccountSnapshot {
            account_exposure,
            open_positions,
            available_cash,
            average_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBackend, PdtPolicy};
    use crate::data::{Bar, StaticBarSource};
    use crate::dsl::parse_strategy_source;
    use crate::error::TradingError;
    use crate::telemetry::null_observer;
    use crate::types::TradingDateTime;
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"STRATEGY
    NAME "basic"
    DESCRIPTION "sample"
    ENTRY
        ALL_OF
            MA5 CROSSED_ABOVE MA20
            CURRENT_PRICE > 100
    EXIT
        ANY_OF
            CURRENT_PRICE > AVERAGE_COST * 1.06
            CURRENT_PRICE < AVERAGE_COST * 0.98
    SIZING
        RULE
            CONDITION
                ANY_OF
                    AVAILABLE_CASH > 10000
            DOLLAR_AMOUNT
                2000
        RULE
            DOLLAR_AMOUNT
                AVAILABLE_CASH * 0.20
"#;

    fn bars_from_closes(closes: &[Decimal]) -> Vec<Bar> {
        let mut dt =
            TradingDateTime::from_daily_close(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                .unwrap();
        let mut bars = Vec::new();
        for close in closes {
            bars.push(
                Bar::new(
                    dt,
                    Money::usd(*close),
                    Money::usd(*close),
                    Money::usd(*close),
                    Money::usd(*close),
                    10_000,
                )
                .unwrap(),
            );
            dt = dt
                .checked_add(Duration::days(1))
                .or_else(|_| dt.checked_add(Duration::days(3)))
                .unwrap();
        }
        bars
    }

    /// 25 closes where MA5 crosses above MA20 on the final bar and the
    /// last close is 150
    fn crossover_closes() -> Vec<Decimal> {
        let mut closes = vec![dec!(100); 20];
        closes.extend_from_slice(&[dec!(90), dec!(90), dec!(90), dec!(90), dec!(150)]);
        closes
    }

    fn engine_with(
        source: StaticBarSource,
        backend: MockBackend,
        strategy_source: &str,
    ) -> TradingEngine {
        let strategy = parse_strategy_source(strategy_source).unwrap();
        let provider = SecurityProvider::new(Box::new(source));
        let broker = Broker::new(Box::new(backend), PdtPolicy::Nun, null_observer());
        TradingEngine::new(strategy, provider, broker, null_observer())
    }

    #[tokio::test]
    async fn test_single_symbol_entry_places_one_buy() {
        let source =
            StaticBarSource::new().with_series("AAPL", bars_from_closes(&crossover_closes()));
        let backend = MockBackend::new().with_cash(Money::usd(dec!(20000)));
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, SAMPLE);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 1);
        assert!(report.symbols_skipped.is_empty());

        let log = orders.read().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].symbol, "AAPL");
        assert_eq!(log[0].side, OrderSide::Buy);
        assert_eq!(
            log[0].size.notional().map(|m| m.amount),
            Some(dec!(2000))
        );
    }

    #[tokio::test]
    async fn test_missing_context_value_skips_symbol() {
        // 30 bars cannot produce MA50; the entry references it
        let strategy = "STRATEGY\n    ENTRY\n        ALL_OF\n            MA50 > 0\n    EXIT\n        ANY_OF\n            CURRENT_PRICE < 1\n    SIZING\n        RULE\n            DOLLAR_AMOUNT\n                100\n";
        let source =
            StaticBarSource::new().with_series("AAPL", bars_from_closes(&vec![dec!(100); 30]));
        let backend = MockBackend::new();
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, strategy);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 0);
        assert_eq!(report.symbols_skipped, vec!["AAPL".to_string()]);
        assert!(orders.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_exit_sells_full_position() {
        // Position at cost 100, price 150: exit condition 150 > 100*1.06
        let source =
            StaticBarSource::new().with_series("AAPL", bars_from_closes(&crossover_closes()));
        let backend = MockBackend::new()
            .with_cash(Money::usd(dec!(20000)))
            .with_position("AAPL", dec!(10), Money::usd(dec!(100)));
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, SAMPLE);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 1);

        let log = orders.read().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].side, OrderSide::Sell);
        assert_eq!(log[0].size.quantity(), Some(dec!(10)));
    }

    #[tokio::test]
    async fn test_no_signal_places_nothing() {
        // Flat closes: no crossover, no position
        let source =
            StaticBarSource::new().with_series("AAPL", bars_from_closes(&vec![dec!(120); 25]));
        let backend = MockBackend::new().with_cash(Money::usd(dec!(20000)));
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, SAMPLE);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 0);
        assert!(orders.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_pdt_violation_aborts_cycle() {
        let source =
            StaticBarSource::new().with_series("AAPL", bars_from_closes(&crossover_closes()));
        let backend = MockBackend::new()
            .with_cash(Money::usd(dec!(20000)))
            .with_day_trade_count(3);
        let mut engine = engine_with(source, backend, SAMPLE);

        assert!(matches!(
            engine.execute().await,
            Err(TradingError::PdtRuleViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_cycle_from_shipped_assets() {
        // Drives the checked-in strategy file and CSV history end to end
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let strategy = crate::dsl::StrategyLoader::new(root.join("strategies"))
            .load("basic")
            .unwrap();
        let source = crate::data::CsvBarSource::new(
            root.join("data/bars"),
            vec!["AAPL".to_string()],
        );
        let backend = MockBackend::new().with_cash(Money::usd(dec!(20000)));
        let orders = backend.order_log();

        let provider = SecurityProvider::new(Box::new(source));
        let broker = Broker::new(Box::new(backend), PdtPolicy::Nun, null_observer());
        let mut engine = TradingEngine::new(strategy, provider, broker, null_observer());

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 1);
        let log = orders.read().await;
        assert_eq!(log[0].symbol, "AAPL");
        assert_eq!(log[0].side, OrderSide::Buy);
        assert_eq!(log[0].size.notional().map(|m| m.amount), Some(dec!(2000)));
    }

    #[tokio::test]
    async fn test_skip_does_not_stop_the_cycle() {
        // AAPL lacks MA20 history and is skipped; MSFT still trades
        let strategy = "STRATEGY\n    ENTRY\n        ALL_OF\n            CURRENT_PRICE > MA20\n    EXIT\n        ANY_OF\n            CURRENT_PRICE < 1\n    SIZING\n        RULE\n            DOLLAR_AMOUNT\n                500\n";
        let mut msft_closes = vec![dec!(100); 24];
        msft_closes.push(dec!(150));
        let source = StaticBarSource::new()
            .with_series("AAPL", bars_from_closes(&vec![dec!(100); 5]))
            .with_series("MSFT", bars_from_closes(&msft_closes));
        let backend = MockBackend::new().with_cash(Money::usd(dec!(20000)));
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, strategy);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.symbols_skipped, vec!["AAPL".to_string()]);
        assert_eq!(report.orders_placed, 1);
        assert_eq!(orders.read().await[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn test_orders_follow_watchlist_order() {
        let mut closes_by_symbol = Vec::new();
        for symbol in ["AAPL", "MSFT"] {
            closes_by_symbol.push((symbol, bars_from_closes(&crossover_closes())));
        }
        let mut source = StaticBarSource::new();
        for (symbol, bars) in closes_by_symbol {
            source = source.with_series(symbol, bars);
        }
        let backend = MockBackend::new().with_cash(Money::usd(dec!(50000)));
        let orders = backend.order_log();
        let mut engine = engine_with(source, backend, SAMPLE);

        let report = engine.execute().await.unwrap();
        assert_eq!(report.orders_placed, 2);
        let log = orders.read().await;
        assert_eq!(log[0].symbol, "AAPL");
        assert_eq!(log[1].symbol, "MSFT");
    }
}
