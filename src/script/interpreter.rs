//! Tree-walking evaluator for parsed scripts
//!
//! Writes go to an overlay so a failing script leaves nothing behind; the
//! caller only sees mutations when the whole program completes.

use super::parser::{BinaryOp, Expr, Literal, Program, Stmt, Target, UnaryOp};
use super::{ClientContext, Mutation, ScriptError, ScriptLimits, ScriptMode, ScriptOutcome};
use crate::variables::VariableStore;
use std::collections::HashMap;
use std::time::Instant;

const MAX_STRING_LEN: usize = 1 << 20;

/// Deadline is checked once per this many steps
const CLOCK_CHECK_INTERVAL: u64 = 1024;

const BUILTINS: &[&str] = &[
    "getVariable",
    "setVariable",
    "redirect",
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
];

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Host(Host),
}

/// Objects the host exposes to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    Variables,
    Console,
    Math,
    Window,
    Location,
    Navigator,
    Document,
    Function(&'static str),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => !(n.is_nan() || *n == 0.0),
            Value::Str(s) => !s.is_empty(),
            Value::Host(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Host(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Num(n) => *n,
            Value::Str(s) => string_to_number(s),
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Host(Host::Function(name)) => format!("function {name}() {{ [native code] }}"),
            Value::Host(_) => "[object Object]".to_string(),
        }
    }

    /// Text stored into the variable store; null and undefined clear the value
    fn into_variable_text(self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Str(s) => s,
            other => other.display(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Host(Host::Function(_)) => "function",
            Value::Host(_) => "object",
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        // Also covers negative zero
        "0".to_string()
    } else {
        n.to_string()
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    match t {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            t.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// Longest numeric prefix, as `parseFloat` reads it
fn parse_float_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let mut best = f64::NAN;
    let mut end = 0;
    for (idx, c) in t.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
            break;
        }
        end = idx + c.len_utf8();
        if let Some(Ok(n)) = t.get(..end).map(str::parse::<f64>) {
            best = n;
        }
    }
    if end == 0 && t.starts_with("Infinity") {
        return f64::INFINITY;
    }
    best
}

fn parse_int_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let prefix: String = digits.chars().take_while(char::is_ascii_digit).collect();
    prefix.parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

/// Non-negative integral number as an index
fn as_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        format_number(n).parse().ok()
    } else {
        None
    }
}

fn count_to_number(count: usize) -> f64 {
    u32::try_from(count).map_or(f64::INFINITY, f64::from)
}

#[allow(clippy::float_cmp)] // script equality is exact
fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x == y,
        _ => a == b,
    }
}

#[allow(clippy::float_cmp)] // script equality is exact
fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Str(_), Value::Str(_)) | (Value::Host(_), Value::Host(_)) => a == b,
        (Value::Host(_), _) | (_, Value::Host(_)) => false,
        _ => a.to_number() == b.to_number(),
    }
}

enum Flow {
    Next,
    Return(Value),
}

pub(super) fn execute(
    program: &Program,
    store: &VariableStore,
    mode: ScriptMode,
    client: &ClientContext,
    limits: ScriptLimits,
) -> Result<ScriptOutcome, ScriptError> {
    let mut interp = Interpreter {
        store,
        mode,
        client,
        limits,
        started: Instant::now(),
        steps: 0,
        scopes: vec![HashMap::new()],
        overlay: HashMap::new(),
        overlay_bytes: 0,
        written: Vec::new(),
        redirect_url: None,
        completion: Value::Undefined,
    };

    let returned = match interp.run_statements(&program.body)? {
        Flow::Return(value) => value,
        Flow::Next => std::mem::replace(&mut interp.completion, Value::Undefined),
    };

    let mut overlay = interp.overlay;
    let mutations = interp
        .written
        .into_iter()
        .filter_map(|name| {
            let value = overlay.remove(&name)?;
            Some(Mutation { name, value })
        })
        .collect();

    Ok(ScriptOutcome {
        redirect_url: interp.redirect_url,
        mutations,
        result: match returned {
            Value::Undefined => None,
            other => Some(other.display()),
        },
    })
}

struct Interpreter<'a> {
    store: &'a VariableStore,
    mode: ScriptMode,
    client: &'a ClientContext,
    limits: ScriptLimits,
    started: Instant,
    steps: u64,
    scopes: Vec<HashMap<String, Value>>,
    /// Latest value per written variable
    overlay: HashMap<String, String>,
    overlay_bytes: usize,
    /// Written names in order of first write
    written: Vec<String>,
    redirect_url: Option<String>,
    completion: Value,
}

impl Interpreter<'_> {
    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::StepLimit);
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 && self.started.elapsed() > self.limits.timeout {
            return Err(ScriptError::Timeout(self.limits.timeout));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session variables
    // ------------------------------------------------------------------

    fn read_variable(&self, name: &str) -> Value {
        self.overlay
            .get(name)
            .map(String::as_str)
            .or_else(|| self.store.get(name))
            .map_or(Value::Undefined, |v| Value::Str(v.to_string()))
    }

    fn write_variable(&mut self, name: String, value: Value) -> Result<(), ScriptError> {
        let value = value.into_variable_text();
        let (previous, is_new) = match self.overlay.get(&name) {
            Some(old) => (old.len(), false),
            None => (0, true),
        };
        let key_bytes = if is_new { name.len() } else { 0 };
        let bytes = self.overlay_bytes - previous + key_bytes + value.len();
        if bytes > self.limits.max_variable_bytes {
            return Err(ScriptError::VariableBytes(self.limits.max_variable_bytes));
        }
        if is_new {
            if self.written.len() >= self.limits.max_variables {
                return Err(ScriptError::TooManyVariables(self.limits.max_variables));
            }
            self.written.push(name.clone());
        }
        self.overlay_bytes = bytes;
        self.overlay.insert(name, value);
        Ok(())
    }

    fn redirect(&mut self, target: &Value) {
        self.redirect_url = Some(target.display());
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn run_statements(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.statement(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn scoped(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        self.scopes.push(HashMap::new());
        let flow = self.run_statements(stmts);
        self.scopes.pop();
        flow
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Let { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
            }
            Stmt::Assign {
                target,
                append,
                value,
            } => self.assign(target, *append, value)?,
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval(cond)?.truthy() {
                    then
                } else {
                    otherwise
                };
                return self.scoped(branch);
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    self.tick()?;
                    if let Flow::Return(value) = self.scoped(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Throw(expr) => return Err(ScriptError::Thrown(self.eval(expr)?.display())),
            Stmt::Expr(expr) => self.completion = self.eval(expr)?,
            Stmt::Block(stmts) => return self.scoped(stmts),
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, target: &Target, append: bool, value: &Expr) -> Result<(), ScriptError> {
        match target {
            Target::Var(name) => {
                let mut value = self.eval(value)?;
                if append {
                    value = add(&self.lookup(name)?, &value)?;
                }
                self.assign_name(name, value)
            }
            Target::Member { object, property } => {
                let object = self.eval(object)?;
                let mut value = self.eval(value)?;
                if append {
                    value = add(&self.get_property(&object, property)?, &value)?;
                }
                self.set_property(&object, property, value)
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let property = self.eval(index)?.display();
                let mut value = self.eval(value)?;
                if append {
                    value = add(&self.get_property(&object, &property)?, &value)?;
                }
                self.set_property(&object, &property, value)
            }
        }
    }

    fn assign_name(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        if let Some(slot) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
        {
            *slot = value;
            return Ok(());
        }
        match name {
            "location" => {
                self.require_client(name)?;
                self.redirect(&value);
                Ok(())
            }
            "variables" | "console" | "Math" | "window" | "navigator" | "document" => Err(
                ScriptError::Runtime(format!("Assignment to built-in '{name}'")),
            ),
            _ => {
                // Undeclared assignment creates a script global
                if let Some(globals) = self.scopes.first_mut() {
                    globals.insert(name.to_string(), value);
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.tick()?;
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Str(s) => Value::Str(s.clone()),
                Literal::Num(n) => Value::Num(*n),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expr::Ident(name) => self.lookup(name),
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                self.get_property(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                if let (Value::Str(s), Value::Num(n)) = (&object, &index) {
                    return Ok(as_index(*n)
                        .and_then(|i| s.chars().nth(i))
                        .map_or(Value::Undefined, |c| Value::Str(c.to_string())));
                }
                self.get_property(&object, &index.display())
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Num(-value.to_number()),
                    UnaryOp::Plus => Value::Num(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn require_client(&self, name: &str) -> Result<(), ScriptError> {
        match self.mode {
            ScriptMode::Client => Ok(()),
            ScriptMode::Server => Err(ScriptError::UnavailableGlobal(name.to_string())),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(value) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(value.clone());
        }
        let host = match name {
            "variables" => Host::Variables,
            "console" => Host::Console,
            "Math" => Host::Math,
            "NaN" => return Ok(Value::Num(f64::NAN)),
            "Infinity" => return Ok(Value::Num(f64::INFINITY)),
            "window" | "location" | "navigator" | "document" => {
                self.require_client(name)?;
                match name {
                    "window" => Host::Window,
                    "location" => Host::Location,
                    "navigator" => Host::Navigator,
                    _ => Host::Document,
                }
            }
            _ => match BUILTINS.iter().find(|b| **b == name) {
                Some(builtin) => Host::Function(*builtin),
                None => return Err(ScriptError::Runtime(format!("{name} is not defined"))),
            },
        };
        Ok(Value::Host(host))
    }

    fn get_property(&self, object: &Value, property: &str) -> Result<Value, ScriptError> {
        let client = self.client;
        let text = |s: &str| Value::Str(s.to_string());
        Ok(match (object, property) {
            (Value::Undefined | Value::Null, _) => {
                return Err(ScriptError::Runtime(format!(
                    "Cannot read properties of {} (reading '{property}')",
                    object.display()
                )))
            }
            (Value::Str(s), "length") => Value::Num(count_to_number(s.chars().count())),
            (Value::Host(Host::Variables), name) => self.read_variable(name),
            (Value::Host(Host::Window), "location") | (Value::Host(Host::Document), "location") => {
                Value::Host(Host::Location)
            }
            (Value::Host(Host::Window), "navigator") => Value::Host(Host::Navigator),
            (Value::Host(Host::Window), "document") => Value::Host(Host::Document),
            (Value::Host(Host::Location), "href") | (Value::Host(Host::Document), "URL") => {
                text(&client.url)
            }
            (Value::Host(Host::Navigator), "userAgent") => text(&client.user_agent),
            (Value::Host(Host::Navigator), "language") => text(&client.language),
            (Value::Host(Host::Document), "referrer") => text(&client.referrer),
            (Value::Host(Host::Document), "title") => text(&client.title),
            (Value::Host(Host::Math), "PI") => Value::Num(std::f64::consts::PI),
            (Value::Host(Host::Math), "E") => Value::Num(std::f64::consts::E),
            _ => Value::Undefined,
        })
    }

    fn set_property(
        &mut self,
        object: &Value,
        property: &str,
        value: Value,
    ) -> Result<(), ScriptError> {
        match (object, property) {
            (Value::Host(Host::Variables), name) => self.write_variable(name.to_string(), value)?,
            (Value::Host(Host::Location), "href")
            | (Value::Host(Host::Window | Host::Document), "location") => self.redirect(&value),
            (Value::Undefined | Value::Null, _) => {
                return Err(ScriptError::Runtime(format!(
                    "Cannot set properties of {} (setting '{property}')",
                    object.display()
                )))
            }
            // Writes to other objects are dropped, as a frozen object would
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, ScriptError> {
        let (receiver, name) = match callee {
            Expr::Member { object, property } => (self.eval(object)?, property.clone()),
            Expr::Index { object, index } => (self.eval(object)?, self.eval(index)?.display()),
            other => {
                let target = self.eval(other)?;
                let args = self.eval_args(args)?;
                return match target {
                    Value::Host(Host::Function(name)) => self.call_builtin(name, args),
                    other => Err(ScriptError::Runtime(format!(
                        "{} is not a function",
                        other.type_name()
                    ))),
                };
            }
        };
        let args = self.eval_args(args)?;
        self.call_method(&receiver, &name, &args)
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Undefined);
        Ok(match name {
            "getVariable" => self.read_variable(&first.display()),
            "setVariable" => {
                let value = args.next().unwrap_or(Value::Undefined);
                self.write_variable(first.display(), value)?;
                Value::Undefined
            }
            "redirect" => {
                self.redirect(&first);
                Value::Undefined
            }
            "String" => Value::Str(first.display()),
            "Number" => Value::Num(first.to_number()),
            "Boolean" => Value::Bool(first.truthy()),
            "parseInt" => Value::Num(parse_int_prefix(&first.display())),
            "parseFloat" => Value::Num(parse_float_prefix(&first.display())),
            "isNaN" => Value::Bool(first.to_number().is_nan()),
            other => return Err(ScriptError::Runtime(format!("{other} is not a function"))),
        })
    }

    fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);

        match receiver {
            Value::Str(s) => {
                let needle = arg(0).display();
                Ok(match name {
                    "toUpperCase" => Value::Str(s.to_uppercase()),
                    "toLowerCase" => Value::Str(s.to_lowercase()),
                    "trim" => Value::Str(s.trim().to_string()),
                    "toString" => Value::Str(s.clone()),
                    "includes" => Value::Bool(s.contains(needle.as_str())),
                    "startsWith" => Value::Bool(s.starts_with(needle.as_str())),
                    "endsWith" => Value::Bool(s.ends_with(needle.as_str())),
                    "indexOf" => Value::Num(s.find(needle.as_str()).map_or(-1.0, |byte| {
                        count_to_number(s.char_indices().take_while(|(i, _)| *i < byte).count())
                    })),
                    _ => return Err(not_a_function("string", name)),
                })
            }
            Value::Num(n) => match name {
                "toString" => Ok(Value::Str(format_number(*n))),
                "toFixed" => {
                    let digits = arg(0).to_number();
                    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
                    let places = (0u32..=20).take_while(|d| f64::from(*d) < digits).count();
                    Ok(Value::Str(format!("{n:.places$}")))
                }
                _ => Err(not_a_function("number", name)),
            },
            Value::Host(Host::Console) => {
                let line = args.iter().map(Value::display).collect::<Vec<_>>().join(" ");
                tracing::debug!(level = name, output = %line, "Script console output");
                Ok(Value::Undefined)
            }
            Value::Host(Host::Math) => math(name, args),
            Value::Host(Host::Location) => match name {
                "assign" | "replace" => {
                    self.redirect(&arg(0));
                    Ok(Value::Undefined)
                }
                "toString" => Ok(Value::Str(self.client.url.clone())),
                _ => Err(not_a_function("location", name)),
            },
            Value::Undefined | Value::Null => Err(ScriptError::Runtime(format!(
                "Cannot read properties of {} (reading '{name}')",
                receiver.display()
            ))),
            other => Err(not_a_function(other.type_name(), name)),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let numeric = |f: fn(f64, f64) -> f64| Value::Num(f(left.to_number(), right.to_number()));
    Ok(match op {
        BinaryOp::Add => return add(left, right),
        BinaryOp::Sub => numeric(|a, b| a - b),
        BinaryOp::Mul => numeric(|a, b| a * b),
        BinaryOp::Div => numeric(|a, b| a / b),
        BinaryOp::Rem => numeric(|a, b| a % b),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_equals(left, right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            Value::Bool(compare(op, left, right))
        }
    })
}

fn add(left: &Value, right: &Value) -> Result<Value, ScriptError> {
    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        let mut text = left.display();
        text.push_str(&right.display());
        if text.len() > MAX_STRING_LEN {
            return Err(ScriptError::Runtime("Invalid string length".to_string()));
        }
        return Ok(Value::Str(text));
    }
    Ok(Value::Num(left.to_number() + right.to_number()))
}

fn not_a_function(owner: &str, name: &str) -> ScriptError {
    ScriptError::Runtime(format!("{owner}.{name} is not a function"))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    match (op, ordering) {
        (_, None) => false,
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}

/// `Math.random` is deliberately absent: turns must replay identically
fn math(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let nums: Vec<f64> = args.iter().map(Value::to_number).collect();
    let x = nums.first().copied().unwrap_or(f64::NAN);
    let y = nums.get(1).copied().unwrap_or(f64::NAN);
    Ok(Value::Num(match name {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sqrt" => x.sqrt(),
        "pow" => x.powf(y),
        "min" => nums.into_iter().fold(f64::INFINITY, f64::min),
        "max" => nums.into_iter().fold(f64::NEG_INFINITY, f64::max),
        _ => return Err(not_a_function("Math", name)),
    }))
}
