//! The two toy expression evaluators behind `eval old` and `eval new`.
//!
//! Both are interactive screens with their own little languages and their
//! own variable environments, kept for the life of the screen.  The old
//! one works on floats with no operator precedence, applying a statement's
//! operators left to right; the new one works on integers and splits each
//! expression at its rightmost operator.  Evaluation failures are ordinary
//! inline replies; they never unwind the session.

use crate::client::Conn;
use crate::handler::{Handler, Step};
use crate::state::State;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const QUIT_WORDS: [&str; 3] = ["exit", "quit", "stop"];

// ---------------------------------------------------------------------
// The old evaluator: floats, statements split on `;`, `=` assignment,
// strictly left-to-right application.

#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum OldEvalError {
    #[error("Must Have Single Token")]
    NotSingleToken,
    #[error("Must Assign to Variable")]
    BadAssignTarget,
    #[error("Must Have Odd Number of Tokens")]
    EvenTokens,
    #[error("Must Have Constant or Variable")]
    ExpectedOperand,
    #[error("Must Have Operation")]
    ExpectedOperator,
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("float division by zero")]
    DivisionByZero,
    #[error("float floor division by zero")]
    FloorDivisionByZero,
    #[error("float modulo")]
    ModuloByZero,
}

const OLD_OPS: &[&str] = &[
    "=", "+", "-", "*", "/", "//", "%", "**", "^", "and", "&", "or", "|", "==", "!=", ">", "<",
    ">=", "<=",
];

#[derive(Clone, Debug)]
enum OldToken {
    Num(f64),
    Ident(String),
    Op(&'static str),
}

#[derive(Debug)]
enum OldExpr {
    Const(f64),
    Var(String),
    Binary(Box<OldExpr>, &'static str, Box<OldExpr>),
    Assign(String, Box<OldExpr>),
}

#[derive(Debug)]
struct OldStatement {
    expr: OldExpr,
    prints: bool,
}

fn old_tokenize(line: &str) -> Vec<Vec<OldToken>> {
    let mut statements = Vec::new();
    for piece in line.replace(';', "\n").split('\n') {
        if piece.is_empty() || piece.starts_with('#') {
            continue;
        }
        let mut tokens = Vec::new();
        for word in piece.split_whitespace() {
            if let Some(op) = OLD_OPS.iter().find(|op| **op == word) {
                tokens.push(OldToken::Op(op));
            } else if let Ok(value) = word.parse::<f64>() {
                tokens.push(OldToken::Num(value));
            } else {
                tokens.push(OldToken::Ident(word.to_owned()));
            }
        }
        if !tokens.is_empty() {
            statements.push(tokens);
        }
    }
    statements
}

/// Folds an operand/operator alternation into a left-associative tree.
fn old_flatten(tokens: &[OldToken]) -> Result<OldExpr, OldEvalError> {
    if tokens.len() % 2 != 1 {
        return Err(OldEvalError::EvenTokens);
    }
    let operand = |token: &OldToken| match token {
        OldToken::Num(value) => Ok(OldExpr::Const(*value)),
        OldToken::Ident(name) => Ok(OldExpr::Var(name.clone())),
        OldToken::Op(_) => Err(OldEvalError::ExpectedOperand),
    };
    let mut expr = operand(&tokens[0])?;
    let mut at = 1;
    while at < tokens.len() {
        let op = match &tokens[at] {
            OldToken::Op(op) => *op,
            _ => return Err(OldEvalError::ExpectedOperator),
        };
        expr = OldExpr::Binary(Box::new(expr), op, Box::new(operand(&tokens[at + 1])?));
        at += 2;
    }
    Ok(expr)
}

fn old_build(tokens: Vec<OldToken>) -> Result<OldStatement, OldEvalError> {
    let has_assign = tokens
        .iter()
        .any(|t| matches!(t, OldToken::Op(op) if *op == "="));
    if !has_assign {
        return Ok(OldStatement {
            expr: old_flatten(&tokens)?,
            prints: true,
        });
    }
    // split on `=`: every section but the last is a single assignment
    // target, the value binds to each from the inside out
    let mut sections: Vec<&[OldToken]> = Vec::new();
    let mut rest = &tokens[..];
    while let Some(at) = rest
        .iter()
        .position(|t| matches!(t, OldToken::Op(op) if *op == "="))
    {
        sections.push(&rest[..at]);
        rest = &rest[at + 1..];
    }
    let mut targets = Vec::new();
    for section in &sections {
        if section.len() != 1 {
            return Err(OldEvalError::NotSingleToken);
        }
        match &section[0] {
            OldToken::Ident(name) => targets.push(name.clone()),
            _ => return Err(OldEvalError::BadAssignTarget),
        }
    }
    let mut expr = old_flatten(rest)?;
    for target in targets.into_iter().rev() {
        expr = OldExpr::Assign(target, Box::new(expr));
    }
    Ok(OldStatement {
        expr,
        prints: false,
    })
}

impl OldExpr {
    fn eval(&self, env: &mut HashMap<String, f64>) -> Result<f64, OldEvalError> {
        match self {
            OldExpr::Const(value) => Ok(*value),
            OldExpr::Var(name) => env
                .get(name)
                .copied()
                .ok_or_else(|| OldEvalError::UnknownVariable(name.clone())),
            OldExpr::Assign(name, value) => {
                let value = value.eval(env)?;
                env.insert(name.clone(), value);
                Ok(value)
            }
            OldExpr::Binary(left, op, right) => {
                let x = left.eval(env)?;
                let y = right.eval(env)?;
                old_apply(x, op, y)
            }
        }
    }
}

fn old_apply(x: f64, op: &str, y: f64) -> Result<f64, OldEvalError> {
    Ok(match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => {
            if y == 0.0 {
                return Err(OldEvalError::DivisionByZero);
            }
            x / y
        }
        "//" => {
            if y == 0.0 {
                return Err(OldEvalError::FloorDivisionByZero);
            }
            (x / y).floor()
        }
        "%" => {
            if y == 0.0 {
                return Err(OldEvalError::ModuloByZero);
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        "**" => x.powf(y),
        "^" => ((x as i64) ^ (y as i64)) as f64,
        "&" => ((x as i64) & (y as i64)) as f64,
        "|" => ((x as i64) | (y as i64)) as f64,
        "and" => {
            if x == 0.0 {
                x
            } else {
                y
            }
        }
        "or" => {
            if x != 0.0 {
                x
            } else {
                y
            }
        }
        "==" => ((x == y) as i64) as f64,
        "!=" => ((x != y) as i64) as f64,
        ">" => ((x > y) as i64) as f64,
        "<" => ((x < y) as i64) as f64,
        ">=" => ((x >= y) as i64) as f64,
        "<=" => ((x <= y) as i64) as f64,
        _ => unreachable!("operator {} slipped through the tokenizer", op),
    })
}

/// Runs one input line: statements split on `;`, parsed up front, then
/// evaluated in order.  Returns whatever the expression statements would
/// print, and the error that stopped evaluation, if any.
pub(crate) fn old_eval_line(
    env: &mut HashMap<String, f64>,
    line: &str,
) -> (Vec<f64>, Option<OldEvalError>) {
    let mut printed = Vec::new();
    let mut statements = Vec::new();
    for tokens in old_tokenize(line) {
        match old_build(tokens) {
            Ok(statement) => statements.push(statement),
            Err(err) => return (printed, Some(err)),
        }
    }
    for statement in statements {
        match statement.expr.eval(env) {
            Ok(value) => {
                if statement.prints {
                    printed.push(value);
                }
                env.insert("_".to_owned(), value);
            }
            Err(err) => return (printed, Some(err)),
        }
    }
    (printed, None)
}

/// Python-flavoured float rendering: whole values keep one decimal.
fn show_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

pub struct OldMathEvaluator {
    env: HashMap<String, f64>,
}

impl OldMathEvaluator {
    pub fn new() -> OldMathEvaluator {
        OldMathEvaluator {
            env: HashMap::new(),
        }
    }
}

impl Default for OldMathEvaluator {
    fn default() -> Self {
        OldMathEvaluator::new()
    }
}

#[async_trait]
impl Handler for OldMathEvaluator {
    async fn handle(&mut self, conn: &mut Conn, _state: &Arc<State>) -> Step {
        loop {
            let line = conn.input(Some("Eval:")).await?;
            if QUIT_WORDS.contains(&line.as_str()) {
                return Ok(None);
            }
            let (printed, err) = old_eval_line(&mut self.env, &line);
            for value in printed {
                conn.print(&show_float(value))?;
            }
            if let Some(err) = err {
                conn.print(&err.to_string())?;
            }
        }
    }
}

// ---------------------------------------------------------------------
// The new evaluator: integers, rightmost-operator splitting, `->`
// assignment, radix-prefixed constants.

#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum NewEvalError {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("NameError: {0}")]
    Name(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("ZeroDivisionError: integer division or modulo by zero")]
    ZeroDivision,
    #[error("OverflowError: integer result too large")]
    Overflow,
}

/// Longest operators first, ties in declaration order; the split scans
/// this list top to bottom.
const NEW_OPS: &[&str] = &[
    "->", "&&", "||", "**", ">>", "<<", "==", "!=", ">=", "<=", "+", "-", "*", "/", "%", "&",
    "|", "^", ">", "<",
];

const ASSIGNMENT: &str = "->";

#[derive(Debug)]
enum NewExpr {
    Const(i64),
    Var(String),
    Op(Box<NewExpr>, &'static str, Box<NewExpr>),
}

/// Finds the rightmost operator occurrence in `expr`: take the first
/// listed operator present, look right of its last occurrence, and keep
/// going until the right side is operator-free.
fn split_tail(expr: &str) -> Option<(&'static str, String)> {
    for &op in NEW_OPS {
        if let Some(at) = expr.rfind(op) {
            let right = expr[at + op.len()..].to_owned();
            return Some(split_tail(&right).unwrap_or((op, right)));
        }
    }
    None
}

fn split_expr(expr: &str) -> Option<(String, &'static str, String)> {
    split_tail(expr).map(|(op, right)| {
        let left = expr[..expr.len() - op.len() - right.len()].to_owned();
        (left, op, right)
    })
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn new_parse(expr: &str) -> Result<NewExpr, NewEvalError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(NewEvalError::Syntax("empty expression".to_owned()));
    }
    if let Some((left, op, right)) = split_expr(expr) {
        return Ok(NewExpr::Op(
            Box::new(new_parse(&left)?),
            op,
            Box::new(new_parse(&right)?),
        ));
    }
    if expr.split_whitespace().count() > 1 {
        return Err(NewEvalError::Syntax(expr.to_owned()));
    }
    for (prefix, radix) in [("0x", 16), ("0d", 10), ("0o", 8), ("0q", 4), ("0b", 2)] {
        if let Some(digits) = expr.strip_prefix(prefix) {
            return i64::from_str_radix(digits, radix).map(NewExpr::Const).map_err(|_| {
                NewEvalError::Value(format!("invalid literal for base {}: {:?}", radix, digits))
            });
        }
    }
    if expr.chars().all(|c| c.is_ascii_digit()) {
        return expr
            .parse::<i64>()
            .map(NewExpr::Const)
            .map_err(|_| NewEvalError::Value(format!("integer too large: {}", expr)));
    }
    if is_identifier(expr) {
        return Ok(NewExpr::Var(expr.to_owned()));
    }
    Err(NewEvalError::Syntax(expr.to_owned()))
}

impl NewExpr {
    fn is_assignment(&self) -> bool {
        matches!(self, NewExpr::Op(_, op, _) if *op == ASSIGNMENT)
    }

    fn eval(&self, env: &mut HashMap<String, i64>) -> Result<i64, NewEvalError> {
        match self {
            NewExpr::Const(value) => Ok(*value),
            NewExpr::Var(name) => env
                .get(name)
                .copied()
                .ok_or_else(|| NewEvalError::Name(name.clone())),
            NewExpr::Op(left, op, right) if *op == ASSIGNMENT => {
                let NewExpr::Var(name) = right.as_ref() else {
                    return Err(NewEvalError::Type(
                        "assignment target must be a variable".to_owned(),
                    ));
                };
                let value = left.eval(env)?;
                env.insert(name.clone(), value);
                Ok(value)
            }
            NewExpr::Op(left, op, right) => {
                let a = left.eval(env)?;
                let b = right.eval(env)?;
                new_apply(a, op, b)
            }
        }
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, NewEvalError> {
    if b == 0 {
        return Err(NewEvalError::ZeroDivision);
    }
    if a == i64::MIN && b == -1 {
        return Err(NewEvalError::Overflow);
    }
    let q = a / b;
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
}

fn floor_mod(a: i64, b: i64) -> Result<i64, NewEvalError> {
    if b == 0 {
        return Err(NewEvalError::ZeroDivision);
    }
    if a == i64::MIN && b == -1 {
        return Err(NewEvalError::Overflow);
    }
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

fn new_apply(a: i64, op: &str, b: i64) -> Result<i64, NewEvalError> {
    let overflow = |value: Option<i64>| value.ok_or(NewEvalError::Overflow);
    Ok(match op {
        "&&" => {
            if a == 0 {
                a
            } else {
                b
            }
        }
        "||" => {
            if a != 0 {
                a
            } else {
                b
            }
        }
        "+" => overflow(a.checked_add(b))?,
        "-" => overflow(a.checked_sub(b))?,
        "*" => overflow(a.checked_mul(b))?,
        "/" => floor_div(a, b)?,
        "%" => floor_mod(a, b)?,
        "**" => {
            if b < 0 {
                return Err(NewEvalError::Value("negative exponent".to_owned()));
            }
            let exp = u32::try_from(b).map_err(|_| NewEvalError::Overflow)?;
            overflow(a.checked_pow(exp))?
        }
        "&" => a & b,
        "|" => a | b,
        "^" => a ^ b,
        ">>" => {
            if b < 0 {
                return Err(NewEvalError::Value("negative shift count".to_owned()));
            }
            let shift = u32::try_from(b).map_err(|_| NewEvalError::Overflow)?;
            overflow(a.checked_shr(shift))?
        }
        "<<" => {
            if b < 0 {
                return Err(NewEvalError::Value("negative shift count".to_owned()));
            }
            let shift = u32::try_from(b).map_err(|_| NewEvalError::Overflow)?;
            overflow(a.checked_shl(shift))?
        }
        "==" => (a == b) as i64,
        "!=" => (a != b) as i64,
        ">" => (a > b) as i64,
        ">=" => (a >= b) as i64,
        "<" => (a < b) as i64,
        "<=" => (a <= b) as i64,
        _ => unreachable!("operator {} slipped through the splitter", op),
    })
}

/// Runs one input line: comments stripped, expressions split on `;`,
/// evaluated in order.  Assignments are silent; everything else prints.
pub(crate) fn new_eval_line(
    env: &mut HashMap<String, i64>,
    line: &str,
) -> (Vec<i64>, Option<NewEvalError>) {
    let mut printed = Vec::new();
    let uncommented = line.split('#').next().unwrap_or("");
    for expression in uncommented.split(';') {
        if expression.trim().is_empty() {
            continue;
        }
        let expr = match new_parse(expression) {
            Ok(expr) => expr,
            Err(err) => return (printed, Some(err)),
        };
        match expr.eval(env) {
            Ok(value) => {
                if !expr.is_assignment() {
                    printed.push(value);
                }
                env.insert("_".to_owned(), value);
            }
            Err(err) => return (printed, Some(err)),
        }
    }
    (printed, None)
}

pub struct NewMathEvaluator {
    env: HashMap<String, i64>,
}

impl NewMathEvaluator {
    pub fn new() -> NewMathEvaluator {
        NewMathEvaluator {
            env: HashMap::new(),
        }
    }
}

impl Default for NewMathEvaluator {
    fn default() -> Self {
        NewMathEvaluator::new()
    }
}

#[async_trait]
impl Handler for NewMathEvaluator {
    async fn handle(&mut self, conn: &mut Conn, _state: &Arc<State>) -> Step {
        loop {
            let line = conn.input(Some(">>> ")).await?;
            if QUIT_WORDS.contains(&line.as_str()) {
                return Ok(None);
            }
            let (printed, err) = new_eval_line(&mut self.env, &line);
            for value in printed {
                conn.print(&value.to_string())?;
            }
            if let Some(err) = err {
                conn.print(&err.to_string())?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn old_line(env: &mut HashMap<String, f64>, line: &str) -> Vec<f64> {
        let (printed, err) = old_eval_line(env, line);
        assert_eq!(err, None, "line {:?}", line);
        printed
    }

    #[test]
    fn old_applies_operators_left_to_right() {
        let mut env = HashMap::new();
        // no precedence: (2 + 3) * 4
        assert_eq!(old_line(&mut env, "2 + 3 * 4"), vec![20.0]);
    }

    #[test]
    fn old_assignment_chains_and_underscore() {
        let mut env = HashMap::new();
        assert!(old_line(&mut env, "a = b = 2 + 1").is_empty());
        assert_eq!(env.get("a"), Some(&3.0));
        assert_eq!(env.get("b"), Some(&3.0));
        assert_eq!(old_line(&mut env, "a * b"), vec![9.0]);
        assert_eq!(env.get("_"), Some(&9.0));
        assert_eq!(old_line(&mut env, "_ + 1"), vec![10.0]);
    }

    #[test]
    fn old_statements_split_on_semicolons() {
        let mut env = HashMap::new();
        assert_eq!(old_line(&mut env, "x = 2 ; x + 1 ; x + 2"), vec![3.0, 4.0]);
    }

    #[test]
    fn old_reports_unknown_variables() {
        let mut env = HashMap::new();
        let (printed, err) = old_eval_line(&mut env, "nope + 1");
        assert!(printed.is_empty());
        assert_eq!(err, Some(OldEvalError::UnknownVariable("nope".to_owned())));
    }

    #[test]
    fn old_rejects_division_by_zero() {
        let mut env = HashMap::new();
        let (_, err) = old_eval_line(&mut env, "1 / 0");
        assert_eq!(err, Some(OldEvalError::DivisionByZero));
        let (_, err) = old_eval_line(&mut env, "1 // 0");
        assert_eq!(err, Some(OldEvalError::FloorDivisionByZero));
    }

    #[test]
    fn old_earlier_prints_survive_a_later_error() {
        let mut env = HashMap::new();
        let (printed, err) = old_eval_line(&mut env, "1 + 1 ; oops");
        assert_eq!(printed, vec![2.0]);
        assert!(err.is_some());
    }

    #[test]
    fn old_truthiness_connectives_return_operands() {
        let mut env = HashMap::new();
        assert_eq!(old_line(&mut env, "0 or 7"), vec![7.0]);
        assert_eq!(old_line(&mut env, "0 and 7"), vec![0.0]);
        assert_eq!(old_line(&mut env, "3 and 7"), vec![7.0]);
    }

    #[test]
    fn old_bad_shapes_are_parse_errors() {
        let mut env = HashMap::new();
        assert_eq!(
            old_eval_line(&mut env, "1 +").1,
            Some(OldEvalError::EvenTokens)
        );
        assert_eq!(
            old_eval_line(&mut env, "1 2 = 3").1,
            Some(OldEvalError::NotSingleToken)
        );
        assert_eq!(
            old_eval_line(&mut env, "4 = 3").1,
            Some(OldEvalError::BadAssignTarget)
        );
    }

    #[test]
    fn float_rendering_matches_the_dialogue() {
        assert_eq!(show_float(7.0), "7.0");
        assert_eq!(show_float(7.5), "7.5");
        assert_eq!(show_float(-2.0), "-2.0");
    }

    fn new_line(env: &mut HashMap<String, i64>, line: &str) -> Vec<i64> {
        let (printed, err) = new_eval_line(env, line);
        assert_eq!(err, None, "line {:?}", line);
        printed
    }

    #[test]
    fn new_splits_at_the_rightmost_operator() {
        let mut env = HashMap::new();
        // parsed as (10 - 4) - 3
        assert_eq!(new_line(&mut env, "10-4-3"), vec![3]);
        // the split point prefers the overall rightmost operator
        assert_eq!(new_line(&mut env, "2*3+4"), vec![10]);
    }

    #[test]
    fn new_assignment_points_into_the_variable() {
        let mut env = HashMap::new();
        assert!(new_line(&mut env, "6*7 -> answer").is_empty());
        assert_eq!(env.get("answer"), Some(&42));
        assert_eq!(new_line(&mut env, "answer"), vec![42]);
        assert_eq!(env.get("_"), Some(&42));
    }

    #[test]
    fn new_radix_prefixes() {
        let mut env = HashMap::new();
        assert_eq!(new_line(&mut env, "0x10"), vec![16]);
        assert_eq!(new_line(&mut env, "0o17"), vec![15]);
        assert_eq!(new_line(&mut env, "0q123"), vec![27]);
        assert_eq!(new_line(&mut env, "0b101"), vec![5]);
        assert_eq!(new_line(&mut env, "0d42"), vec![42]);
    }

    #[test]
    fn new_floor_division_follows_the_divisor_sign() {
        let mut env = HashMap::new();
        assert_eq!(new_line(&mut env, "7/2"), vec![3]);
        assert_eq!(new_line(&mut env, "0-7/2"), vec![-4]);
        assert_eq!(new_line(&mut env, "7%3"), vec![1]);
        assert_eq!(floor_div(-7, 2), Ok(-4));
        assert_eq!(floor_mod(-7, 2), Ok(1));
        assert_eq!(floor_div(7, -2), Ok(-4));
        assert_eq!(floor_mod(7, -2), Ok(-1));
    }

    #[test]
    fn new_division_by_zero_is_inline() {
        let mut env = HashMap::new();
        let (_, err) = new_eval_line(&mut env, "1/0");
        assert_eq!(err, Some(NewEvalError::ZeroDivision));
    }

    #[test]
    fn new_unknown_names_and_syntax_errors() {
        let mut env = HashMap::new();
        assert_eq!(
            new_eval_line(&mut env, "ghost").1,
            Some(NewEvalError::Name("ghost".to_owned()))
        );
        assert!(matches!(
            new_eval_line(&mut env, "1 2").1,
            Some(NewEvalError::Syntax(_))
        ));
        assert!(matches!(
            new_eval_line(&mut env, "5 -> 3").1,
            Some(NewEvalError::Type(_))
        ));
    }

    #[test]
    fn new_comments_and_semicolons() {
        let mut env = HashMap::new();
        assert_eq!(new_line(&mut env, "1+1 ; 2*2 # trailing words"), vec![2, 4]);
        assert!(new_line(&mut env, "# nothing at all").is_empty());
    }

    #[test]
    fn new_connectives_return_operands() {
        let mut env = HashMap::new();
        assert_eq!(new_line(&mut env, "0||9"), vec![9]);
        assert_eq!(new_line(&mut env, "0&&9"), vec![0]);
        assert_eq!(new_line(&mut env, "2&&9"), vec![9]);
    }
}
