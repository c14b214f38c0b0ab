/// Centralized error types for the trading engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradingError {
    // DSL Front End Errors
    #[error("Lex error at line {line}: {message}")]
    LexError { message: String, line: u32 },

    #[error("Parse error at line {line}: {message}")]
    ParseError { message: String, line: u32 },

    // Market Data Errors
    #[error("Invalid bar data: {0}")]
    BarValidation(String),

    #[error("No bars for symbol: {0}")]
    NoBarsForSymbol(String),

    #[error("Insufficient bars: {0}")]
    InsufficientBars(String),

    // Evaluation Errors
    #[error("Missing context value: {0}")]
    MissingContextValue(String),

    #[error("Arithmetic error: {0}")]
    ArithmeticError(String),

    #[error("Sizing error: {0}")]
    SizingError(String),

    // Value Type Errors
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),

    #[error("Invalid trading date: {0}")]
    InvalidTradingDate(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    // Broker Errors
    #[error("PDT rule violation: {0}")]
    PdtRuleViolation(String),

    #[error("PDT strategy invariant breached: {0}")]
    PdtStrategyError(String),

    #[error("Broker error: {0}")]
    BrokerError(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // File I/O Errors
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // Network Errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TradingError>;

impl TradingError {
    /// Check if the per-symbol trading loop may recover from this error
    pub fn is_skippable(&self) -> bool {
        matches!(self, TradingError::MissingContextValue(_))
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            TradingError::LexError { .. } => "DSL_001",
            TradingError::ParseError { .. } => "DSL_002",
            TradingError::BarValidation(_) => "DATA_001",
            TradingError::NoBarsForSymbol(_) => "DATA_002",
            TradingError::InsufficientBars(_) => "DATA_003",
            TradingError::MissingContextValue(_) => "EVAL_001",
            TradingError::ArithmeticError(_) => "EVAL_002",
            TradingError::SizingError(_) => "EVAL_003",
            TradingError::CurrencyMismatch(_) => "VALUE_001",
            TradingError::InvalidTradingDate(_) => "VALUE_002",
            TradingError::InvalidOrder(_) => "VALUE_003",
            TradingError::PdtRuleViolation(_) => "PDT_001",
            TradingError::PdtStrategyError(_) => "PDT_002",
            TradingError::BrokerError(_) => "BROKER_001",
            TradingError::ConfigError(_) => "CFG_001",
            TradingError::FileError(_) => "FILE_001",
            TradingError::FileNotFound(_) => "FILE_002",
            TradingError::HttpError(_) => "NET_001",
            TradingError::DeserializationError(_) => "NET_002",
        }
    }
}
