pub mod bar;
pub mod provider;
pub mod security;
pub mod source;
pub mod yahoo;

pub use bar::Bar;
pub use provider::SecurityProvider;
pub use security::Security;
pub use source::{BarSource, CsvBarSource, StaticBarSource};
pub use yahoo::YahooBarSource;
