/// Strategy file loading
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dsl::ast::StrategyAst;
use crate::dsl::parser::parse_strategy_source;
use crate::error::{Result, TradingError};

const STRATEGY_EXTENSION: &str = "trdr";

/// Loads `.trdr` strategy files from a strategies directory
pub struct StrategyLoader {
    strategies_dir: PathBuf,
}

impl StrategyLoader {
    pub fn new<P: AsRef<Path>>(strategies_dir: P) -> Self {
        StrategyLoader {
            strategies_dir: strategies_dir.as_ref().to_path_buf(),
        }
    }

    /// Load and parse a strategy by name; the extension may be omitted
    pub fn load(&self, name: &str) -> Result<StrategyAst> {
        let path = self.file_path(name);
        if !path.exists() {
            return Err(TradingError::FileNotFound(format!(
                "strategy file not found: {}",
                path.display()
            )));
        }
        let source = std::fs::read_to_string(&path)?;
        let strategy = parse_strategy_source(&source).map_err(|e| annotate(e, &source, &path))?;
        info!("Loaded strategy '{}' from {}", strategy.name, path.display());
        Ok(strategy)
    }

    fn file_path(&self, name: &str) -> PathBuf {
        let file_name = if name.ends_with(&format!(".{}", STRATEGY_EXTENSION)) {
            name.to_string()
        } else {
            format!("{}.{}", name, STRATEGY_EXTENSION)
        };
        self.strategies_dir.join(file_name)
    }
}

/// Attach the offending source line to lex/parse errors
fn annotate(error: TradingError, source: &str, path: &Path) -> TradingError {
    let (message, line) = match &error {
        TradingError::ParseError { message, line } => (message.clone(), *line),
        TradingError::LexError { message, line } => (message.clone(), *line),
        _ => return error,
    };
    let snippet = source
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .unwrap_or("")
        .trim_end();
    let annotated = format!("{} in {}\n>> {}", message, path.display(), snippet);
    match error {
        TradingError::LexError { .. } => TradingError::LexError {
            message: annotated,
            line,
        },
        _ => TradingError::ParseError {
            message: annotated,
            line,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_strategy(dir: &Path, name: &str, body: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    const VALID: &str = "STRATEGY\n    NAME \"t\"\n    ENTRY\n        ALL_OF\n            CURRENT_PRICE > 1\n    EXIT\n        ANY_OF\n            CURRENT_PRICE < 1\n    SIZING\n        RULE\n            DOLLAR_AMOUNT\n                100\n";

    #[test]
    fn test_load_appends_extension() {
        let dir = std::env::temp_dir().join("strata_loader_ext");
        std::fs::create_dir_all(&dir).unwrap();
        write_strategy(&dir, "basic.trdr", VALID);

        let loader = StrategyLoader::new(&dir);
        let strategy = loader.load("basic").unwrap();
        assert_eq!(strategy.name, "t");
    }

    #[test]
    fn test_missing_file() {
        let loader = StrategyLoader::new("/nonexistent");
        assert!(matches!(
            loader.load("ghost"),
            Err(TradingError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_parse_error_carries_snippet() {
        let dir = std::env::temp_dir().join("strata_loader_err");
        std::fs::create_dir_all(&dir).unwrap();
        write_strategy(
            &dir,
            "bad.trdr",
            "STRATEGY\n    ENTRY\n        CURRENT_PRICE > 100\n",
        );

        let loader = StrategyLoader::new(&dir);
        match loader.load("bad") {
            Err(TradingError::ParseError { message, line }) => {
                assert_eq!(line, 3);
                assert!(message.contains(">> CURRENT_PRICE > 100"));
            }
            other => panic!("expected ParseError, got {:?}", other),
        }
    }
}
