/// Strategy AST and its context-driven evaluator
///
/// Expressions live in two worlds that never mix: arithmetic positions
/// evaluate to decimals, condition positions evaluate to booleans. A
/// comparison result is not a number and a number is not a truth value.
use std::fmt;

use rust_decimal::Decimal;

use crate::data::Security;
use crate::dsl::context::{ContextIdentifier, StrategyContext};
use crate::error::{Result, TradingError};

/// Binary operators accepted by the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Eq,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Eq)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Eq => "==",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Moving-average crossover operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverOp {
    CrossedAbove,
    CrossedBelow,
}

impl CrossoverOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CrossoverOp::CrossedAbove => "CROSSED_ABOVE",
            CrossoverOp::CrossedBelow => "CROSSED_BELOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(Decimal),
    Text(String),
}

/// One expression node; tagged variants instead of a class hierarchy
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(ContextIdentifier),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Crossover {
        left: ContextIdentifier,
        op: CrossoverOp,
        right: ContextIdentifier,
    },
    AllOf(Vec<Expression>),
    AnyOf(Vec<Expression>),
}

/// Everything the evaluator may consult for one symbol iteration
pub struct EvalContext<'a> {
    pub values: &'a StrategyContext,
    pub security: &'a Security,
}

impl<'a> EvalContext<'a> {
    pub fn new(values: &'a StrategyContext, security: &'a Security) -> Self {
        EvalContext { values, security }
    }
}

impl Expression {
    /// Evaluate in an arithmetic position
    pub fn eval_number(&self, ctx: &EvalContext) -> Result<Decimal> {
        match self {
            Expression::Literal(Literal::Number(value)) => Ok(*value),
            Expression::Literal(Literal::Text(text)) => Err(TradingError::ArithmeticError(
                format!("string literal \"{}\" in numeric position", text),
            )),
            Expression::Identifier(id) => {
                let value = ctx
                    .values
                    .get(*id)
                    .ok_or_else(|| TradingError::MissingContextValue(id.as_str().to_string()))?;
                Ok(value.as_decimal())
            }
            Expression::Binary { left, op, right } => {
                if op.is_comparison() {
                    return Err(TradingError::ArithmeticError(format!(
                        "comparison '{}' in numeric position",
                        op
                    )));
                }
                let lhs = left.eval_number(ctx)?;
                let rhs = right.eval_number(ctx)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs.is_zero() {
                            return Err(TradingError::ArithmeticError(
                                "division by zero".to_string(),
                            ));
                        }
                        Ok(lhs / rhs)
                    }
                    _ => unreachable!("comparison handled above"),
                }
            }
            Expression::Crossover { .. } | Expression::AllOf(_) | Expression::AnyOf(_) => {
                Err(TradingError::ArithmeticError(
                    "boolean expression in numeric position".to_string(),
                ))
            }
        }
    }

    /// Evaluate in a condition position; short-circuits composites
    pub fn eval_bool(&self, ctx: &EvalContext) -> Result<bool> {
        match self {
            Expression::Binary { left, op, right } if op.is_comparison() => {
                let lhs = left.eval_number(ctx)?;
                let rhs = right.eval_number(ctx)?;
                Ok(match op {
                    BinaryOp::Gt => lhs > rhs,
                    BinaryOp::Lt => lhs < rhs,
                    BinaryOp::Eq => lhs == rhs,
                    _ => unreachable!("guarded by is_comparison"),
                })
            }
            Expression::Crossover { left, op, right } => {
                let short = left.moving_average_timeframe().ok_or_else(|| {
                    TradingError::ArithmeticError(format!(
                        "crossover operand {} is not a moving average",
                        left
                    ))
                })?;
                let long = right.moving_average_timeframe().ok_or_else(|| {
                    TradingError::ArithmeticError(format!(
                        "crossover operand {} is not a moving average",
                        right
                    ))
                })?;
                match op {
                    CrossoverOp::CrossedAbove => ctx.security.bullish_crossover(short, long),
                    CrossoverOp::CrossedBelow => ctx.security.bearish_crossover(short, long),
                }
            }
            Expression::AllOf(children) => {
                for child in children {
                    if !child.eval_bool(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::AnyOf(children) => {
                for child in children {
                    if child.eval_bool(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(TradingError::ArithmeticError(
                "expression does not evaluate to a boolean".to_string(),
            )),
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Expression::AllOf(_) | Expression::AnyOf(_))
    }

    /// Render in single-line form; composites are block-level and are
    /// handled by `write_block`
    fn write_inline(&self, out: &mut String) {
        match self {
            Expression::Literal(Literal::Number(value)) => out.push_str(&value.to_string()),
            Expression::Literal(Literal::Text(text)) => {
                out.push('"');
                out.push_str(text);
                out.push('"');
            }
            Expression::Identifier(id) => out.push_str(id.as_str()),
            Expression::Binary { left, op, right } => {
                Self::write_operand(left, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                Self::write_operand(right, out);
            }
            Expression::Crossover { left, op, right } => {
                out.push_str(left.as_str());
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                out.push_str(right.as_str());
            }
            Expression::AllOf(_) | Expression::AnyOf(_) => {
                debug_assert!(false, "composite rendered inline");
            }
        }
    }

    fn write_operand(expr: &Expression, out: &mut String) {
        if matches!(expr, Expression::Binary { .. }) {
            out.push('(');
            expr.write_inline(out);
            out.push(')');
        } else {
            expr.write_inline(out);
        }
    }

    /// Render as an indented block at the given depth
    fn write_block(&self, depth: usize, out: &mut String) {
        match self {
            Expression::AllOf(children) => {
                push_line(out, depth, "ALL_OF");
                for child in children {
                    child.write_block(depth + 1, out);
                }
            }
            Expression::AnyOf(children) => {
                push_line(out, depth, "ANY_OF");
                for child in children {
                    child.write_block(depth + 1, out);
                }
            }
            _ => {
                let mut line = String::new();
                self.write_inline(&mut line);
                push_line(out, depth, &line);
            }
        }
    }
}

fn push_line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push_str(text);
    out.push('\n');
}

/// One sizing rule: optional condition plus the dollar-amount expression
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRule {
    pub condition: Option<Expression>,
    pub value: Expression,
}

/// Ordered sizing rules; first match wins
#[derive(Debug, Clone, PartialEq)]
pub struct Sizing {
    pub rules: Vec<SizingRule>,
}

impl Sizing {
    /// Dollar amount from the first rule whose condition is absent or true
    pub fn evaluate(&self, ctx: &EvalContext) -> Result<Decimal> {
        for rule in &self.rules {
            let matched = match &rule.condition {
                None => true,
                Some(condition) => condition.eval_bool(ctx)?,
            };
            if matched {
                return rule.value.eval_number(ctx);
            }
        }
        Err(TradingError::SizingError(
            "no sizing rule matched".to_string(),
        ))
    }
}

/// A fully parsed strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAst {
    pub name: String,
    pub description: String,
    pub entry: Expression,
    pub exit: Expression,
    pub sizing: Sizing,
}

impl StrategyAst {
    pub fn evaluate_entry(&self, ctx: &EvalContext) -> Result<bool> {
        self.entry.eval_bool(ctx)
    }

    pub fn evaluate_exit(&self, ctx: &EvalContext) -> Result<bool> {
        self.exit.eval_bool(ctx)
    }

    pub fn evaluate_sizing(&self, ctx: &EvalContext) -> Result<Decimal> {
        self.sizing.evaluate(ctx)
    }

    /// Render canonical DSL source; parsing the result reproduces this AST
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, 0, "STRATEGY");
        push_line(&mut out, 1, &format!("NAME \"{}\"", self.name));
        push_line(&mut out, 1, &format!("DESCRIPTION \"{}\"", self.description));
        push_line(&mut out, 1, "ENTRY");
        self.entry.write_block(2, &mut out);
        push_line(&mut out, 1, "EXIT");
        self.exit.write_block(2, &mut out);
        push_line(&mut out, 1, "SIZING");
        for rule in &self.sizing.rules {
            push_line(&mut out, 2, "RULE");
            if let Some(condition) = &rule.condition {
                push_line(&mut out, 3, "CONDITION");
                condition.write_block(4, &mut out);
            }
            push_line(&mut out, 3, "DOLLAR_AMOUNT");
            rule.value.write_block(4, &mut out);
        }
        out
    }
}

impl fmt::Display for StrategyAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::dsl::context::ContextValue;
    use crate::types::{Money, TradingDateTime};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn dummy_security() -> Security {
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let bar = Bar::new(
            TradingDateTime::from_daily_close(monday).unwrap(),
            Money::usd(dec!(100)),
            Money::usd(dec!(100)),
            Money::usd(dec!(100)),
            Money::usd(dec!(100)),
            1_000,
        )
        .unwrap();
        Security::new("TEST".to_string(), bar.clone(), vec![bar])
    }

    fn context_with(values: &[(ContextIdentifier, Decimal)]) -> StrategyContext {
        let mut context = StrategyContext::new();
        for (id, value) in values {
            context.insert(*id, ContextValue::Decimal(*value));
        }
        context
    }

    fn num(value: Decimal) -> Expression {
        Expression::Literal(Literal::Number(value))
    }

    fn cmp(left: Expression, op: BinaryOp, right: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn division_by_zero() -> Expression {
        cmp(
            cmp(num(dec!(1)), BinaryOp::Div, num(dec!(0))),
            BinaryOp::Gt,
            num(dec!(0)),
        )
    }

    #[test]
    fn test_arithmetic_evaluation() {
        let values = StrategyContext::new();
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let expr = cmp(
            num(dec!(2)),
            BinaryOp::Add,
            cmp(num(dec!(3)), BinaryOp::Mul, num(dec!(4))),
        );
        assert_eq!(expr.eval_number(&ctx).unwrap(), dec!(14));
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let values = StrategyContext::new();
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        assert!(matches!(
            division_by_zero().eval_bool(&ctx),
            Err(TradingError::ArithmeticError(_))
        ));
    }

    #[test]
    fn test_identifier_missing_from_context() {
        let values = StrategyContext::new();
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let expr = Expression::Identifier(ContextIdentifier::Ma50);
        match expr.eval_number(&ctx) {
            Err(TradingError::MissingContextValue(name)) => assert_eq!(name, "MA50"),
            other => panic!("expected MissingContextValue, got {:?}", other),
        }
    }

    #[test]
    fn test_all_of_short_circuits() {
        let values = context_with(&[(ContextIdentifier::CurrentPrice, dec!(50))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        // First child is false; the poisoned second child must never run
        let expr = Expression::AllOf(vec![
            cmp(
                Expression::Identifier(ContextIdentifier::CurrentPrice),
                BinaryOp::Gt,
                num(dec!(100)),
            ),
            division_by_zero(),
        ]);
        assert_eq!(expr.eval_bool(&ctx).unwrap(), false);
    }

    #[test]
    fn test_any_of_short_circuits() {
        let values = context_with(&[(ContextIdentifier::CurrentPrice, dec!(150))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let expr = Expression::AnyOf(vec![
            cmp(
                Expression::Identifier(ContextIdentifier::CurrentPrice),
                BinaryOp::Gt,
                num(dec!(100)),
            ),
            division_by_zero(),
        ]);
        assert_eq!(expr.eval_bool(&ctx).unwrap(), true);
    }

    #[test]
    fn test_all_of_requires_every_child() {
        let values = context_with(&[(ContextIdentifier::CurrentPrice, dec!(150))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let truthy = cmp(
            Expression::Identifier(ContextIdentifier::CurrentPrice),
            BinaryOp::Gt,
            num(dec!(100)),
        );
        let falsy = cmp(
            Expression::Identifier(ContextIdentifier::CurrentPrice),
            BinaryOp::Lt,
            num(dec!(100)),
        );

        assert!(Expression::AllOf(vec![truthy.clone(), truthy.clone()])
            .eval_bool(&ctx)
            .unwrap());
        assert!(!Expression::AllOf(vec![truthy, falsy]).eval_bool(&ctx).unwrap());
    }

    #[test]
    fn test_numbers_are_not_booleans() {
        let values = StrategyContext::new();
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        assert!(matches!(
            num(dec!(1)).eval_bool(&ctx),
            Err(TradingError::ArithmeticError(_))
        ));
        assert!(matches!(
            cmp(num(dec!(1)), BinaryOp::Gt, num(dec!(0))).eval_number(&ctx),
            Err(TradingError::ArithmeticError(_))
        ));
    }

    #[test]
    fn test_sizing_first_match_wins() {
        let values = context_with(&[(ContextIdentifier::AvailableCash, dec!(20000))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let sizing = Sizing {
            rules: vec![
                SizingRule {
                    condition: Some(cmp(
                        Expression::Identifier(ContextIdentifier::AvailableCash),
                        BinaryOp::Gt,
                        num(dec!(10000)),
                    )),
                    value: num(dec!(2000)),
                },
                SizingRule {
                    condition: None,
                    value: num(dec!(500)),
                },
            ],
        };
        assert_eq!(sizing.evaluate(&ctx).unwrap(), dec!(2000));
    }

    #[test]
    fn test_sizing_falls_through_to_unconditional_rule() {
        let values = context_with(&[(ContextIdentifier::AvailableCash, dec!(5000))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let sizing = Sizing {
            rules: vec![
                SizingRule {
                    condition: Some(cmp(
                        Expression::Identifier(ContextIdentifier::AvailableCash),
                        BinaryOp::Gt,
                        num(dec!(10000)),
                    )),
                    value: num(dec!(2000)),
                },
                SizingRule {
                    condition: None,
                    value: cmp(
                        Expression::Identifier(ContextIdentifier::AvailableCash),
                        BinaryOp::Mul,
                        num(dec!(0.20)),
                    ),
                },
            ],
        };
        assert_eq!(sizing.evaluate(&ctx).unwrap(), dec!(1000.00));
    }

    #[test]
    fn test_sizing_no_rule_matched() {
        let values = context_with(&[(ContextIdentifier::AvailableCash, dec!(5000))]);
        let security = dummy_security();
        let ctx = EvalContext::new(&values, &security);

        let sizing = Sizing {
            rules: vec![SizingRule {
                condition: Some(cmp(
                    Expression::Identifier(ContextIdentifier::AvailableCash),
                    BinaryOp::Gt,
                    num(dec!(10000)),
                )),
                value: num(dec!(2000)),
            }],
        };
        assert!(matches!(
            sizing.evaluate(&ctx),
            Err(TradingError::SizingError(_))
        ));
    }
}
