/// Alpaca brokerage backend (REST)
///
/// Credentials and endpoint come from the environment:
/// `ALPACA_API_KEY`, `ALPACA_SECRET_KEY`, `ALPACA_BASE_URL`
/// (paper: https://paper-api.alpaca.markets, live: https://api.alpaca.markets).
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::broker::models::{AccountState, OrderSide, OrderSize, Position};
use crate::broker::BrokerBackend;
use crate::error::{Result, TradingError};
use crate::types::{Money, TradingDateTime};

const API_KEY_VAR: &str = "ALPACA_API_KEY";
const SECRET_KEY_VAR: &str = "ALPACA_SECRET_KEY";
const BASE_URL_VAR: &str = "ALPACA_BASE_URL";

#[derive(Debug, Deserialize)]
struct AccountDto {
    cash: String,
    equity: String,
    daytrade_count: u32,
}

#[derive(Debug, Deserialize)]
struct PositionDto {
    symbol: String,
    qty: String,
    avg_entry_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderDto {
    filled_at: Option<DateTime<Utc>>,
}

pub struct AlpacaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl AlpacaBackend {
    /// Build from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = require_env(API_KEY_VAR)?;
        let secret_key = require_env(SECRET_KEY_VAR)?;
        let base_url = require_env(BASE_URL_VAR)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            HeaderValue::from_str(&api_key)
                .map_err(|e| TradingError::ConfigError(format!("invalid API key: {}", e)))?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            HeaderValue::from_str(&secret_key)
                .map_err(|e| TradingError::ConfigError(format!("invalid secret key: {}", e)))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        info!("Alpaca backend configured for {}", base_url);
        Ok(AlpacaBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::BrokerError(format!(
                "Alpaca API error on {}: {} - {}",
                path, status, body
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| TradingError::ConfigError(format!("{} is not set", name)))
}

fn parse_decimal(value: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|_| {
        TradingError::BrokerError(format!("Alpaca returned unparsable {}: '{}'", field, value))
    })
}

#[async_trait]
impl BrokerBackend for AlpacaBackend {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn refresh(&mut self) -> Result<AccountState> {
        let account: AccountDto = self.get_json("/v2/account").await?;
        let holdings: Vec<PositionDto> = self.get_json("/v2/positions").await?;

        let as_of = TradingDateTime::now();
        let mut positions = HashMap::new();
        for holding in holdings {
            let quantity = parse_decimal(&holding.qty, "qty")?;
            let avg_entry_price = parse_decimal(&holding.avg_entry_price, "avg_entry_price")?;
            let position = Position::from_holding(
                &holding.symbol,
                quantity,
                Money::usd(avg_entry_price),
                as_of,
            )?;
            positions.insert(holding.symbol, position);
        }

        debug!("Alpaca refresh: {} positions", positions.len());
        Ok(AccountState {
            cash: Money::usd(parse_decimal(&account.cash, "cash")?),
            equity: Money::usd(parse_decimal(&account.equity, "equity")?),
            positions,
            day_trade_count: account.daytrade_count,
        })
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: &OrderSize,
    ) -> Result<()> {
        let mut body = json!({
            "symbol": symbol,
            "side": side.as_str().to_lowercase(),
            "type": "market",
            "time_in_force": "day",
        });
        match size {
            OrderSize::Notional(amount) => {
                body["notional"] = json!(amount.amount.to_string());
            }
            OrderSize::Quantity(quantity) => {
                body["qty"] = json!(quantity.to_string());
            }
        }

        let response = self
            .client
            .post(self.url("/v2/orders"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TradingError::BrokerError(format!(
                "Alpaca rejected order for {}: {} - {}",
                symbol, status, text
            )));
        }
        info!("Alpaca accepted {} {}", side.as_str(), symbol);
        Ok(())
    }

    async fn cancel_all_orders(&mut self) -> Result<()> {
        let response = self.client.delete(self.url("/v2/orders")).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TradingError::BrokerError(format!(
                "Alpaca cancel-all failed: {} - {}",
                status, text
            )));
        }
        Ok(())
    }

    async fn position_opened_today(&self, symbol: &str) -> Result<bool> {
        let today = Utc::now().date_naive();
        let path = format!(
            "/v2/orders?status=closed&side=buy&symbols={}&after={}T00:00:00Z",
            symbol, today
        );
        let orders: Vec<OrderDto> = self.get_json(&path).await?;
        Ok(orders
            .iter()
            .any(|o| o.filled_at.is_some_and(|at| at.date_naive() == today)))
    }
}
