/// Security provider: materializes Security values from a bar source
use tracing::debug;

use crate::data::security::Security;
use crate::data::source::BarSource;
use crate::error::Result;

/// Adapter turning raw bar history into `Security` values for the engine
pub struct SecurityProvider {
    source: Box<dyn BarSource>,
}

impl SecurityProvider {
    pub fn new(source: Box<dyn BarSource>) -> Self {
        SecurityProvider { source }
    }

    /// Materialize one security
    pub async fn security(&self, symbol: &str) -> Result<Security> {
        let bars = self.source.bars(symbol).await?;
        let current_bar = self.source.current_bar(symbol).await?;
        debug!("Materialized {} with {} bars", symbol, bars.len());
        Ok(Security::new(symbol.to_string(), current_bar, bars))
    }

    /// Materialize every security the source can serve, in source order
    pub async fn securities(&self) -> Result<Vec<Security>> {
        let symbols = self.source.symbols().await?;
        let mut securities = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            securities.push(self.security(symbol).await?);
        }
        Ok(securities)
    }
}
