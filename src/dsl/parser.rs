/// Recursive-descent parser for the strategy DSL
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::dsl::ast::{
    BinaryOp, CrossoverOp, Expression, Literal, Sizing, SizingRule, StrategyAst,
};
use crate::dsl::context::ContextIdentifier;
use crate::dsl::lexer::{Lexer, Token, TokenKind};
use crate::error::{Result, TradingError};

/// Lex and parse strategy source in one step
pub fn parse_strategy_source(source: &str) -> Result<StrategyAst> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

/// Parser over the token stream produced by the lexer
///
/// Uppercase keywords are matched case-insensitively. Errors carry the
/// line of the token that broke the grammar.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line: 0,
            });
        }
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn err_here(&self, message: impl Into<String>) -> TradingError {
        TradingError::ParseError {
            message: message.into(),
            line: self.current().line,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.current().clone();
        if token.kind != kind {
            return Err(self.err_here(format!(
                "expected {:?}, got {:?} '{}'",
                kind, token.kind, token.text
            )));
        }
        self.advance();
        Ok(token)
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Token> {
        let token = self.current().clone();
        if token.kind != TokenKind::Identifier || !token.text.eq_ignore_ascii_case(word) {
            return Err(self.err_here(format!(
                "expected '{}', got {:?} '{}'",
                word, token.kind, token.text
            )));
        }
        self.advance();
        Ok(token)
    }

    fn at_keyword(&self, word: &str) -> bool {
        let token = self.current();
        token.kind == TokenKind::Identifier && token.text.eq_ignore_ascii_case(word)
    }

    fn at_composite(&self) -> bool {
        self.at_keyword("ALL_OF") || self.at_keyword("ANY_OF")
    }

    fn at_block_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Dedent | TokenKind::Eof)
    }

    pub fn parse(mut self) -> Result<StrategyAst> {
        let strategy = self.parse_strategy()?;
        if self.current().kind != TokenKind::Eof {
            return Err(self.err_here(format!(
                "unexpected trailing input '{}'",
                self.current().text
            )));
        }
        Ok(strategy)
    }

    fn parse_strategy(&mut self) -> Result<StrategyAst> {
        self.expect_keyword("STRATEGY")?;
        self.expect(TokenKind::Indent)?;

        let mut name = None;
        let mut description = None;
        let mut entry = None;
        let mut exit = None;
        let mut sizing = None;

        while !self.at_block_end() {
            let field = self.expect(TokenKind::Identifier)?;
            match field.text.to_ascii_uppercase().as_str() {
                "NAME" => name = Some(self.parse_string_field()?),
                "DESCRIPTION" => description = Some(self.parse_string_field()?),
                "ENTRY" => entry = Some(self.parse_entry_or_exit()?),
                "EXIT" => exit = Some(self.parse_entry_or_exit()?),
                "SIZING" => sizing = Some(self.parse_sizing()?),
                _ => {
                    return Err(TradingError::ParseError {
                        message: format!("unknown field '{}'", field.text),
                        line: field.line,
                    })
                }
            }
        }
        self.expect(TokenKind::Dedent)?;

        let entry = entry.ok_or_else(|| self.err_here("strategy is missing an ENTRY block"))?;
        let exit = exit.ok_or_else(|| self.err_here("strategy is missing an EXIT block"))?;
        let sizing = sizing.ok_or_else(|| self.err_here("strategy is missing a SIZING block"))?;

        Ok(StrategyAst {
            name: name.unwrap_or_default(),
            description: description.unwrap_or_default(),
            entry,
            exit,
            sizing,
        })
    }

    fn parse_string_field(&mut self) -> Result<String> {
        let token = self.expect(TokenKind::Str)?;
        Ok(unquote(&token.text))
    }

    /// Entry/exit bodies must be exactly one composite expression
    fn parse_entry_or_exit(&mut self) -> Result<Expression> {
        self.expect(TokenKind::Indent)?;
        if !self.at_composite() {
            return Err(self.err_here(
                "entry/exit block must start with a composite operator (ALL_OF or ANY_OF)",
            ));
        }
        let expr = self.parse_expression()?;
        if self.current().kind != TokenKind::Dedent {
            return Err(self.err_here(
                "entry/exit block must contain a single composite expression \
                 (wrap multiple conditions inside ALL_OF or ANY_OF)",
            ));
        }
        self.expect(TokenKind::Dedent)?;
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        if self.at_keyword("ALL_OF") {
            self.advance();
            Ok(Expression::AllOf(self.parse_composite_block()?))
        } else if self.at_keyword("ANY_OF") {
            self.advance();
            Ok(Expression::AnyOf(self.parse_composite_block()?))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_composite_block(&mut self) -> Result<Vec<Expression>> {
        self.expect(TokenKind::Indent)?;
        let mut children = Vec::new();
        while !self.at_block_end() {
            children.push(self.parse_expression()?);
        }
        if children.is_empty() {
            return Err(self.err_here("composite block must contain at least one expression"));
        }
        self.expect(TokenKind::Dedent)?;
        Ok(children)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let left = self.parse_arithmetic()?;
        let token = self.current().clone();

        if token.kind == TokenKind::Operator && matches!(token.text.as_str(), ">" | "<" | "==") {
            let op = match token.text.as_str() {
                ">" => BinaryOp::Gt,
                "<" => BinaryOp::Lt,
                _ => BinaryOp::Eq,
            };
            self.advance();
            let right = self.parse_arithmetic()?;
            return Ok(Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        if token.kind == TokenKind::Identifier
            && (token.text.eq_ignore_ascii_case("CROSSED_ABOVE")
                || token.text.eq_ignore_ascii_case("CROSSED_BELOW"))
        {
            let op = if token.text.eq_ignore_ascii_case("CROSSED_ABOVE") {
                CrossoverOp::CrossedAbove
            } else {
                CrossoverOp::CrossedBelow
            };
            self.advance();
            let right = self.parse_arithmetic()?;
            let (left_id, right_id) = match (&left, &right) {
                (Expression::Identifier(l), Expression::Identifier(r)) => (*l, *r),
                _ => {
                    return Err(TradingError::ParseError {
                        message: format!("{} requires identifier operands", op.symbol()),
                        line: token.line,
                    })
                }
            };
            if !left_id.is_moving_average() || !right_id.is_moving_average() {
                return Err(TradingError::ParseError {
                    message: format!(
                        "{} requires moving-average operands, got {} and {}",
                        op.symbol(),
                        left_id,
                        right_id
                    ),
                    line: token.line,
                });
            }
            return Ok(Expression::Crossover {
                left: left_id,
                op,
                right: right_id,
            });
        }

        Ok(left)
    }

    fn parse_arithmetic(&mut self) -> Result<Expression> {
        let mut expr = self.parse_term()?;
        loop {
            let token = self.current();
            let op = match (token.kind, token.text.as_str()) {
                (TokenKind::Operator, "+") => BinaryOp::Add,
                (TokenKind::Operator, "-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expression> {
        let mut expr = self.parse_factor()?;
        loop {
            let token = self.current();
            let op = match (token.kind, token.text.as_str()) {
                (TokenKind::Operator, "*") => BinaryOp::Mul,
                (TokenKind::Operator, "/") => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = Decimal::from_str(&token.text).map_err(|_| {
                    TradingError::ParseError {
                        message: format!("invalid number format '{}'", token.text),
                        line: token.line,
                    }
                })?;
                Ok(Expression::Literal(Literal::Number(value)))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expression::Literal(Literal::Text(unquote(&token.text))))
            }
            TokenKind::Identifier => {
                self.advance();
                let id = ContextIdentifier::parse(&token.text).ok_or_else(|| {
                    TradingError::ParseError {
                        message: format!("unknown identifier '{}'", token.text),
                        line: token.line,
                    }
                })?;
                Ok(Expression::Identifier(id))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_arithmetic()?;
                self.expect(TokenKind::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.err_here(format!(
                "unexpected {:?} '{}'",
                token.kind, token.text
            ))),
        }
    }

    fn parse_sizing(&mut self) -> Result<Sizing> {
        self.expect(TokenKind::Indent)?;
        let mut rules = Vec::new();
        while !self.at_block_end() {
            self.expect_keyword("RULE")?;
            rules.push(self.parse_sizing_rule()?);
        }
        if rules.is_empty() {
            return Err(self.err_here("sizing block requires at least one RULE"));
        }
        self.expect(TokenKind::Dedent)?;
        Ok(Sizing { rules })
    }

    fn parse_sizing_rule(&mut self) -> Result<SizingRule> {
        let rule_line = self.current().line;
        self.expect(TokenKind::Indent)?;

        let mut condition = None;
        let mut value = None;
        while !self.at_block_end() {
            let field = self.expect(TokenKind::Identifier)?;
            match field.text.to_ascii_uppercase().as_str() {
                "CONDITION" => condition = Some(self.parse_condition_block()?),
                "DOLLAR_AMOUNT" => {
                    self.expect(TokenKind::Indent)?;
                    value = Some(self.parse_expression()?);
                    self.expect(TokenKind::Dedent)?;
                }
                _ => {
                    return Err(TradingError::ParseError {
                        message: format!("unexpected field '{}' in sizing rule", field.text),
                        line: field.line,
                    })
                }
            }
        }
        self.expect(TokenKind::Dedent)?;

        let value = value.ok_or(TradingError::ParseError {
            message: "sizing rule must have a DOLLAR_AMOUNT".to_string(),
            line: rule_line,
        })?;
        Ok(SizingRule { condition, value })
    }

    fn parse_condition_block(&mut self) -> Result<Expression> {
        self.expect(TokenKind::Indent)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Dedent)?;
        Ok(expr)
    }
}

fn unquote(text: &str) -> String {
    text.trim_matches('"').to_string()
}
