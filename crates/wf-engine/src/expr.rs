//! Condition expression evaluator
//!
//! Condition expressions come from untrusted flow authors, so this is a
//! closed grammar evaluated by a hand-rolled lexer and precedence-climbing
//! parser. It supports `context` dotted/indexed access with optional
//! chaining, literals, the boolean/comparison/arithmetic operators,
//! `Number(...)`, `.toLowerCase()`, and `.includes(...)`. Nothing else
//! lexes, so host code can never run. Callers map every error to `false`.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("Disallowed token in expression: {0}")]
    Disallowed(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Eval error: {0}")]
    Eval(String),
}

/// Identifiers that never lex, even as member keys.
const BANNED_IDENTS: &[&str] = &[
    "eval",
    "require",
    "process",
    "globalThis",
    "window",
    "Function",
    "function",
    "constructor",
    "prototype",
    "__proto__",
    "import",
    "this",
    "new",
    "while",
    "for",
    "do",
    "class",
    "async",
    "await",
    "return",
    "var",
    "let",
    "const",
];

/// Evaluate a condition expression against the session context.
pub fn eval_bool(expression: &str, context: &Value) -> Result<bool, ExprError> {
    let tokens = lex(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    let value = eval(&expr, context)?;
    Ok(truthy(&value))
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    AndAnd,
    OrOr,
    Not,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    OptDot,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            ';' | '{' | '}' | '`' | '\\' | '\n' | '\r' => {
                return Err(ExprError::Disallowed(c.to_string()));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '?' => {
                if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::OptDot);
                    i += 2;
                } else {
                    return Err(ExprError::Disallowed("?".to_string()));
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Disallowed("&".to_string()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Disallowed("|".to_string()));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                    // '===' collapses to '=='.
                    if chars.get(i) == Some(&'=') {
                        i += 1;
                    }
                } else if chars.get(i + 1) == Some(&'>') {
                    return Err(ExprError::Disallowed("=>".to_string()));
                } else {
                    return Err(ExprError::Disallowed("=".to_string()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                    if chars.get(i) == Some(&'=') {
                        i += 1;
                    }
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(ExprError::Parse("unterminated string".to_string())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Parse(format!("bad number '{}'", text)))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if BANNED_IDENTS.contains(&ident.as_str()) {
                    return Err(ExprError::Disallowed(ident));
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ExprError::Disallowed(other.to_string())),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Context,
    Member { object: Box<Expr>, key: String, optional: bool },
    Index { object: Box<Expr>, index: Box<Expr> },
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr>, optional: bool },
    NumberCast(Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(ExprError::Parse(format!("expected {:?}, found {:?}", token, self.peek())))
        }
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(ExprError::Parse(format!("trailing tokens at {:?}", self.peek())))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary { op: BinOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::Binary { op: BinOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.eat(&Token::EqEq) {
                BinOp::Eq
            } else if self.eat(&Token::NotEq) {
                BinOp::Ne
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat(&Token::Le) {
                BinOp::Le
            } else if self.eat(&Token::Ge) {
                BinOp::Ge
            } else if self.eat(&Token::Lt) {
                BinOp::Lt
            } else if self.eat(&Token::Gt) {
                BinOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            Ok(Expr::Not(Box::new(self.parse_unary()?)))
        } else if self.eat(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                expr = self.parse_access(expr, false)?;
            } else if self.eat(&Token::OptDot) {
                expr = self.parse_access(expr, true)?;
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index) };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_access(&mut self, object: Expr, optional: bool) -> Result<Expr, ExprError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(ExprError::Parse(format!("expected member name, found {:?}", other))),
        };

        if self.eat(&Token::LParen) {
            let mut args = Vec::new();
            if !self.eat(&Token::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if self.eat(&Token::RParen) {
                        break;
                    }
                    self.expect(Token::Comma)?;
                }
            }
            match name.as_str() {
                "toLowerCase" | "includes" => Ok(Expr::MethodCall {
                    object: Box::new(object),
                    method: name,
                    args,
                    optional,
                }),
                other => Err(ExprError::Disallowed(format!("method '{}'", other))),
            }
        } else {
            Ok(Expr::Member { object: Box::new(object), key: name, optional })
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Lit(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Lit(Value::Null)),
                "context" => Ok(Expr::Context),
                "Number" => {
                    self.expect(Token::LParen)?;
                    let inner = self.parse_expr()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::NumberCast(Box::new(inner)))
                }
                other => Err(ExprError::Parse(format!("unknown identifier '{}'", other))),
            },
            other => Err(ExprError::Parse(format!("unexpected token {:?}", other))),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Runtime value. Kept separate from `serde_json::Value` because arithmetic
/// needs NaN.
#[derive(Debug, Clone)]
enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Json(Value),
}

impl From<&Value> for Val {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Val::Null,
            Value::Bool(b) => Val::Bool(*b),
            Value::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Val::Str(s.clone()),
            other => Val::Json(other.clone()),
        }
    }
}

fn truthy(value: &Val) -> bool {
    match value {
        Val::Null => false,
        Val::Bool(b) => *b,
        Val::Num(n) => *n != 0.0 && !n.is_nan(),
        Val::Str(s) => !s.is_empty(),
        Val::Json(_) => true,
    }
}

fn to_number(value: &Val) -> f64 {
    match value {
        Val::Null => 0.0,
        Val::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Val::Num(n) => *n,
        Val::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Val::Json(_) => f64::NAN,
    }
}

fn js_string(value: &Val) -> String {
    match value {
        Val::Null => "null".to_string(),
        Val::Bool(b) => b.to_string(),
        Val::Num(n) => {
            if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Val::Str(s) => s.clone(),
        Val::Json(v) => v.to_string(),
    }
}

fn loose_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Null, Val::Null) => true,
        (Val::Null, _) | (_, Val::Null) => false,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::Num(a), Val::Num(b)) => a == b,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Json(a), Val::Json(b)) => a == b,
        (Val::Json(_), _) | (_, Val::Json(_)) => false,
        // Mixed scalar types coerce numerically, as JS loose equality does.
        (a, b) => {
            let (na, nb) = (to_number(a), to_number(b));
            !na.is_nan() && !nb.is_nan() && na == nb
        }
    }
}

fn compare(op: BinOp, left: &Val, right: &Val) -> bool {
    if let (Val::Str(a), Val::Str(b)) = (left, right) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => false,
        };
    }
    let (a, b) = (to_number(left), to_number(right));
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => false,
    }
}

fn eval(expr: &Expr, context: &Value) -> Result<Val, ExprError> {
    match expr {
        Expr::Lit(value) => Ok(Val::from(value)),
        Expr::Context => Ok(Val::Json(context.clone())),
        Expr::Member { object, key, optional } => {
            let object = eval(object, context)?;
            match object {
                Val::Null if *optional => Ok(Val::Null),
                Val::Null => Err(ExprError::Eval(format!("cannot read '{}' of null", key))),
                Val::Json(value) => Ok(value.get(key.as_str()).map(Val::from).unwrap_or(Val::Null)),
                _ => Ok(Val::Null),
            }
        }
        Expr::Index { object, index } => {
            let object = eval(object, context)?;
            let index = eval(index, context)?;
            match object {
                Val::Null => Err(ExprError::Eval("cannot index null".to_string())),
                Val::Json(value) => {
                    let item = match &index {
                        Val::Num(n) if *n >= 0.0 => value.get(*n as usize),
                        other => value.get(js_string(other).as_str()),
                    };
                    Ok(item.map(Val::from).unwrap_or(Val::Null))
                }
                _ => Ok(Val::Null),
            }
        }
        Expr::MethodCall { object, method, args, optional } => {
            let object = eval(object, context)?;
            if matches!(object, Val::Null) {
                return if *optional {
                    Ok(Val::Null)
                } else {
                    Err(ExprError::Eval(format!("cannot call '{}' on null", method)))
                };
            }
            match method.as_str() {
                "toLowerCase" => match &object {
                    Val::Str(s) => Ok(Val::Str(s.to_lowercase())),
                    other => Ok(Val::Str(js_string(other).to_lowercase())),
                },
                "includes" => {
                    let needle = args
                        .first()
                        .map(|a| eval(a, context))
                        .transpose()?
                        .unwrap_or(Val::Null);
                    match &object {
                        Val::Str(haystack) => {
                            Ok(Val::Bool(haystack.contains(js_string(&needle).as_str())))
                        }
                        Val::Json(Value::Array(items)) => Ok(Val::Bool(
                            items.iter().any(|item| loose_eq(&Val::from(item), &needle)),
                        )),
                        _ => Err(ExprError::Eval("includes() needs a string or array".to_string())),
                    }
                }
                other => Err(ExprError::Disallowed(format!("method '{}'", other))),
            }
        }
        Expr::NumberCast(inner) => Ok(Val::Num(to_number(&eval(inner, context)?))),
        Expr::Not(inner) => Ok(Val::Bool(!truthy(&eval(inner, context)?))),
        Expr::Neg(inner) => Ok(Val::Num(-to_number(&eval(inner, context)?))),
        Expr::Binary { op, left, right } => match op {
            BinOp::Or => {
                let l = eval(left, context)?;
                if truthy(&l) {
                    Ok(l)
                } else {
                    eval(right, context)
                }
            }
            BinOp::And => {
                let l = eval(left, context)?;
                if truthy(&l) {
                    eval(right, context)
                } else {
                    Ok(l)
                }
            }
            BinOp::Eq => Ok(Val::Bool(loose_eq(&eval(left, context)?, &eval(right, context)?))),
            BinOp::Ne => Ok(Val::Bool(!loose_eq(&eval(left, context)?, &eval(right, context)?))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                Ok(Val::Bool(compare(*op, &eval(left, context)?, &eval(right, context)?)))
            }
            BinOp::Add => {
                let (l, r) = (eval(left, context)?, eval(right, context)?);
                if matches!(l, Val::Str(_)) || matches!(r, Val::Str(_)) {
                    Ok(Val::Str(js_string(&l) + &js_string(&r)))
                } else {
                    Ok(Val::Num(to_number(&l) + to_number(&r)))
                }
            }
            BinOp::Sub => Ok(Val::Num(
                to_number(&eval(left, context)?) - to_number(&eval(right, context)?),
            )),
            BinOp::Mul => Ok(Val::Num(
                to_number(&eval(left, context)?) * to_number(&eval(right, context)?),
            )),
            BinOp::Div => Ok(Val::Num(
                to_number(&eval(left, context)?) / to_number(&eval(right, context)?),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_comparison() {
        let context = json!({ "n": "5" });
        assert!(eval_bool("Number(context.n) > 3", &context).unwrap());
        assert!(!eval_bool("Number(context.n) > 7", &context).unwrap());
        assert!(eval_bool("Number(context.n) >= 5", &context).unwrap());
    }

    #[test]
    fn test_string_equality_and_methods() {
        let context = json!({ "city": "Córdoba", "reply": "SOPORTE" });
        assert!(eval_bool("context.city == 'Córdoba'", &context).unwrap());
        assert!(eval_bool("context.reply.toLowerCase() == 'soporte'", &context).unwrap());
        assert!(eval_bool("context.city.includes('rdo')", &context).unwrap());
        assert!(!eval_bool("context.city.includes('xyz')", &context).unwrap());
    }

    #[test]
    fn test_array_includes() {
        let context = json!({ "tags": ["vip", "beta"] });
        assert!(eval_bool("context.tags.includes('vip')", &context).unwrap());
        assert!(!eval_bool("context.tags.includes('basic')", &context).unwrap());
    }

    #[test]
    fn test_boolean_connectives_and_negation() {
        let context = json!({ "a": 1, "b": 0 });
        assert!(eval_bool("context.a == 1 && !context.b", &context).unwrap());
        assert!(eval_bool("context.b == 1 || context.a == 1", &context).unwrap());
        assert!(!eval_bool("context.b && context.a", &context).unwrap());
    }

    #[test]
    fn test_arithmetic_and_parentheses() {
        let context = json!({ "n": 4 });
        assert!(eval_bool("(context.n + 2) * 3 == 18", &context).unwrap());
        assert!(eval_bool("context.n / 2 - 1 == 1", &context).unwrap());
    }

    #[test]
    fn test_optional_chaining_tolerates_missing() {
        let context = json!({});
        assert!(!eval_bool("context.user?.name == 'Ana'", &context).unwrap());
        // Plain access on a null object is an eval error, not a panic.
        assert!(eval_bool("context.user.name == 'Ana'", &context).is_err());
    }

    #[test]
    fn test_loose_numeric_equality_across_types() {
        let context = json!({ "n": "5" });
        assert!(eval_bool("context.n == 5", &context).unwrap());
        assert!(eval_bool("context.n != 6", &context).unwrap());
    }

    #[test]
    fn test_triple_equals_collapses() {
        let context = json!({ "a": "x" });
        assert!(eval_bool("context.a === 'x'", &context).unwrap());
        assert!(eval_bool("context.a !== 'y'", &context).unwrap());
    }

    #[test]
    fn test_host_identifiers_rejected() {
        let context = json!({});
        for expression in [
            "process.exit(1)",
            "require('fs')",
            "globalThis.x",
            "eval('1')",
            "context.constructor",
            "context.__proto__",
            "(function(){})()",
        ] {
            assert!(
                matches!(eval_bool(expression, &context), Err(ExprError::Disallowed(_))),
                "expected Disallowed for {expression}"
            );
        }
    }

    #[test]
    fn test_statement_syntax_rejected() {
        let context = json!({});
        assert!(eval_bool("1; 2", &context).is_err());
        assert!(eval_bool("{ }", &context).is_err());
        assert!(eval_bool("context.a = 1", &context).is_err());
        assert!(eval_bool("`template`", &context).is_err());
    }

    #[test]
    fn test_unknown_root_identifier_rejected() {
        let context = json!({});
        assert!(eval_bool("document.cookie", &context).is_err());
        assert!(eval_bool("Math.random()", &context).is_err());
    }

    #[test]
    fn test_division_by_zero_is_not_fatal() {
        let context = json!({ "n": 1 });
        // 1/0 is infinity, which is truthy; NaN comparisons are false.
        assert!(eval_bool("context.n / 0 > 100", &context).unwrap());
        assert!(!eval_bool("context.missing2 * 2 > 0", &context).unwrap());
    }
}
