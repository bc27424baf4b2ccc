//! Guard and band expression evaluation.
//!
//! Tiny boolean expression language used by rubrics: bare identifiers
//! resolved against a flat context, comparisons, `&&`/`||`, unary `!`,
//! parentheses. No function calls, no member access. Evaluation is total:
//! malformed expressions and missing inputs bias toward `false` instead of
//! failing, so a rubric pass never aborts a triage mid-incident.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Flat input context for rubric evaluation.
pub type Context = serde_json::Map<String, Json>;

/// Comparison operators supported by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

/// Parsed expression tree. Built once per rubric load, evaluated many times.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Num(f64),
    Bool(bool),
    Ident(String),
    /// The reserved fallback expression (`"otherwise"` or blank input).
    Always,
}

/// Runtime value during evaluation. Missing identifiers resolve to
/// `Undefined`, which is falsy and fails every ordered comparison.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Bool(bool),
    Str(String),
    Undefined,
}

impl Value {
    fn from_json(v: &Json) -> Value {
        match v {
            Json::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            Json::Bool(b) => Value::Bool(*b),
            Json::String(s) => Value::Str(s.clone()),
            _ => Value::Undefined,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Undefined => false,
        }
    }

    /// Numeric coercion for ordered comparisons. Anything that is not a
    /// number becomes NaN, and NaN never satisfies a comparison.
    fn as_num(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Undefined => f64::NAN,
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Undefined, Value::Undefined) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Bool(bool),
    Op(CmpOp),
    AndAnd,
    OrOr,
    Not,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '>' | '<' | '=' | '!' => {
                let eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, eq) {
                    ('>', true) => Some(Token::Op(CmpOp::Ge)),
                    ('<', true) => Some(Token::Op(CmpOp::Le)),
                    ('=', true) => Some(Token::Op(CmpOp::Eq)),
                    ('!', true) => Some(Token::Op(CmpOp::Ne)),
                    ('>', false) => Some(Token::Op(CmpOp::Gt)),
                    ('<', false) => Some(Token::Op(CmpOp::Lt)),
                    ('!', false) => Some(Token::Not),
                    _ => None,
                };
                match op {
                    Some(t) => {
                        i += if eq { 2 } else { 1 };
                        tokens.push(t);
                    }
                    None => return Err(format!("unexpected character '{}' at {}", c, i)),
                }
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse().map_err(|_| format!("bad number '{}'", text))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_lowercase().as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(format!("unexpected character '{}' at {}", c, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    // or := and ('||' and)*
    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.current() == Some(&Token::OrOr) {
            self.eat();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and := comp ('&&' comp)*
    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comp()?;
        while self.current() == Some(&Token::AndAnd) {
            self.eat();
            let right = self.parse_comp()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // comp := term (cmp-op term)?
    fn parse_comp(&mut self) -> Result<Expr, String> {
        let left = self.parse_term()?;
        if let Some(Token::Op(op)) = self.current().cloned() {
            self.eat();
            let right = self.parse_term()?;
            return Ok(Expr::Cmp(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    // term := '!' term | num | bool | id | '(' or ')'
    fn parse_term(&mut self) -> Result<Expr, String> {
        match self.eat() {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_term()?))),
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Bool(b)) => Ok(Expr::Bool(b)),
            Some(Token::Ident(id)) => Ok(Expr::Ident(id)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.eat() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

impl Expr {
    /// Parse an expression string. `"otherwise"` and blank input parse to
    /// the unconditional fallback.
    pub fn parse(src: &str) -> Result<Expr, String> {
        let trimmed = src.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("otherwise") {
            return Ok(Expr::Always);
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err("trailing tokens".to_string());
        }
        Ok(expr)
    }

    fn eval(&self, ctx: &Context) -> Value {
        match self {
            Expr::Or(l, r) => Value::Bool(l.eval(ctx).truthy() || r.eval(ctx).truthy()),
            Expr::And(l, r) => Value::Bool(l.eval(ctx).truthy() && r.eval(ctx).truthy()),
            Expr::Not(e) => Value::Bool(!e.eval(ctx).truthy()),
            Expr::Cmp(op, l, r) => {
                let lv = l.eval(ctx);
                let rv = r.eval(ctx);
                let out = match op {
                    CmpOp::Eq => lv.loose_eq(&rv),
                    CmpOp::Ne => !lv.loose_eq(&rv),
                    CmpOp::Ge => lv.as_num() >= rv.as_num(),
                    CmpOp::Le => lv.as_num() <= rv.as_num(),
                    CmpOp::Gt => lv.as_num() > rv.as_num(),
                    CmpOp::Lt => lv.as_num() < rv.as_num(),
                };
                Value::Bool(out)
            }
            Expr::Num(n) => Value::Num(*n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Ident(id) => ctx.get(id).map(Value::from_json).unwrap_or(Value::Undefined),
            Expr::Always => Value::Bool(true),
        }
    }

    /// Evaluate to a boolean via truthiness.
    pub fn eval_bool(&self, ctx: &Context) -> bool {
        self.eval(ctx).truthy()
    }
}

/// Parse-and-evaluate convenience. Parse failures evaluate to `false`.
pub fn evaluate(src: &str, ctx: &Context) -> bool {
    match Expr::parse(src) {
        Ok(e) => e.eval_bool(ctx),
        Err(_) => false,
    }
}

/// An expression string paired with its lazily compiled AST. The AST is
/// built at most once per load; a parse failure compiles to `None` and
/// evaluates fail-closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompiledExpr {
    raw: String,
    #[serde(skip)]
    cell: OnceCell<Option<Expr>>,
}

impl CompiledExpr {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            cell: OnceCell::new(),
        }
    }

    /// The original expression text, verbatim.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn compiled(&self, score_shorthand: bool) -> &Option<Expr> {
        self.cell.get_or_init(|| {
            let src = if score_shorthand {
                expand_score_shorthand(&self.raw)
            } else {
                self.raw.trim().to_string()
            };
            Expr::parse(&src).ok()
        })
    }

    /// Evaluate against a context; unparseable expressions are `false`.
    pub fn eval_bool(&self, ctx: &Context) -> bool {
        match self.compiled(false) {
            Some(e) => e.eval_bool(ctx),
            None => false,
        }
    }

    /// Evaluate a weighted-rubric band against a score. Bare threshold
    /// forms like `">=0.8"` are shorthand for `"score >= 0.8"`.
    pub fn eval_band(&self, score: f64) -> bool {
        let mut ctx = Context::new();
        ctx.insert("score".to_string(), Json::from(score));
        match self.compiled(true) {
            Some(e) => e.eval_bool(&ctx),
            None => false,
        }
    }
}

impl From<&str> for CompiledExpr {
    fn from(raw: &str) -> Self {
        CompiledExpr::new(raw)
    }
}

fn expand_score_shorthand(raw: &str) -> String {
    let s = raw.trim();
    for op in [">=", "<=", "==", "!=", ">", "<"] {
        if s.starts_with(op) {
            return format!("score {}", s);
        }
    }
    s.to_string()
}

static CLAMP_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^clamp:(\d+(?:\.\d+)?)\.\.(\d+(?:\.\d+)?)->(\d+(?:\.\d+)?)\.\.(\d+(?:\.\d+)?)$")
        .expect("clamp spec regex")
});

/// Apply a normalization spec like `clamp:0..180->0..1`: clamp into the
/// input range, then rescale linearly into the output range. No spec or an
/// unrecognized spec is the identity.
pub fn normalize(value: f64, spec: Option<&str>) -> f64 {
    let Some(spec) = spec else { return value };
    let Some(caps) = CLAMP_SPEC.captures(spec.trim()) else {
        return value;
    };
    let bound = |i: usize| caps[i].parse::<f64>().unwrap_or(0.0);
    let (in_min, in_max, out_min, out_max) = (bound(1), bound(2), bound(3), bound(4));
    let clamped = value.clamp(in_min.min(in_max), in_max.max(in_min));
    let span = in_max - in_min;
    let ratio = if span == 0.0 {
        0.0
    } else {
        (clamped - in_min) / span
    };
    out_min + ratio * (out_max - out_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Json)]) -> Context {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn comparisons_and_boolean_operators() {
        let c = ctx(&[("x", json!(true)), ("y", json!(5))]);
        assert!(evaluate("x == true", &c));
        assert!(!evaluate("y <= 3", &c));
        assert!(evaluate("y >= 3 && x == true", &c));
        assert!(evaluate("y < 3 || x", &c));
        assert!(evaluate("(y > 10 || y > 4) && x", &c));
    }

    #[test]
    fn bare_identifier_truthiness() {
        let c = ctx(&[("storageHealth", json!(true)), ("zero", json!(0))]);
        assert!(evaluate("storageHealth", &c));
        assert!(!evaluate("zero", &c));
        assert!(!evaluate("missing", &c));
    }

    #[test]
    fn unary_negation() {
        let c = ctx(&[("degraded", json!(false))]);
        assert!(evaluate("!degraded", &c));
        assert!(evaluate("!missing", &c));
        assert!(!evaluate("!!missing", &c));
    }

    #[test]
    fn missing_identifiers_fail_numeric_comparisons() {
        let c = Context::new();
        assert!(!evaluate("latency >= 0", &c));
        assert!(!evaluate("latency < 100", &c));
        assert!(!evaluate("latency == 0", &c));
    }

    #[test]
    fn otherwise_and_blank_are_unconditionally_true() {
        let c = Context::new();
        assert!(evaluate("otherwise", &c));
        assert!(evaluate("OTHERWISE", &c));
        assert!(evaluate("   ", &c));
    }

    #[test]
    fn malformed_expression_is_false_not_panic() {
        let c = Context::new();
        assert!(!evaluate("a ===== b", &c));
        assert!(!evaluate("((", &c));
        assert!(!evaluate("a @@ b", &c));
    }

    #[test]
    fn band_shorthand_prefixes_score() {
        let band = CompiledExpr::new(">=0.8");
        assert!(band.eval_band(0.9));
        assert!(!band.eval_band(0.5));
        let explicit = CompiledExpr::new("score >= 0.8");
        assert!(explicit.eval_band(0.8));
    }

    #[test]
    fn normalize_clamp_spec() {
        assert_eq!(normalize(90.0, Some("clamp:0..180->0..1")), 0.5);
        assert_eq!(normalize(400.0, Some("clamp:0..180->0..1")), 1.0);
        assert_eq!(normalize(-5.0, Some("clamp:0..180->0..1")), 0.0);
        // identity without a spec or with an unknown one
        assert_eq!(normalize(42.0, None), 42.0);
        assert_eq!(normalize(42.0, Some("sigmoid")), 42.0);
    }

    #[test]
    fn equality_is_strict_across_types() {
        let c = ctx(&[("n", json!(1)), ("b", json!(true))]);
        assert!(!evaluate("n == b", &c));
        assert!(evaluate("n == 1", &c));
        assert!(evaluate("b == true", &c));
        assert!(evaluate("n != b", &c));
    }
}
