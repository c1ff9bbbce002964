#![allow(dead_code)]

//! Toy host-language fixture: a regex statement parser and an integer
//! arithmetic interpreter, plus spies used across the suites.

use equation_engine::signals::{EquationFields, EquationSignals, GroupFields};
use equation_engine::{Connection, EquationManager, GroupId};
use equation_model::{
    Context, EvalStatus, InterpretMode, InterpretResult, ItemKind, ParseItem, ParseMode,
    ParseResult, Value, EXPRESSION_ITEM_NAME,
};
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

fn assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s*$").unwrap())
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").unwrap())
}

fn expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Za-z_][A-Za-z0-9_]*|\d+)(?:\s*[+\-*/]\s*(?:[A-Za-z_][A-Za-z0-9_]*|\d+))*$",
        )
        .unwrap()
    })
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|\d+|[+\-*/]").unwrap())
}

fn dependencies_of(expr: &str) -> Vec<String> {
    ident_re()
        .find_iter(expr)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Splits `a=1;b=a+2` into one [`ParseItem`] per declaration.
pub fn toy_parse(source: &str, mode: ParseMode) -> ParseResult {
    if mode == ParseMode::Expression {
        let code = source.trim();
        let item = ParseItem {
            name: EXPRESSION_ITEM_NAME.to_string(),
            code: code.to_string(),
            kind: ItemKind::Expression,
            dependencies: dependencies_of(code),
        };
        return ParseResult::success(mode, vec![item]);
    }

    let mut items = Vec::new();
    for piece in source.split(';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some(captures) = assign_re().captures(piece) else {
            return ParseResult::error(
                mode,
                EvalStatus::SyntaxError,
                "assignment operator '=' not found or variable name missing",
            );
        };
        let expression = captures.get(2).map_or("", |m| m.as_str());
        items.push(ParseItem {
            name: captures[1].to_string(),
            code: expression.to_string(),
            kind: ItemKind::Variable,
            dependencies: dependencies_of(expression),
        });
    }
    if items.is_empty() {
        return ParseResult::error(mode, EvalStatus::SyntaxError, "empty statement");
    }
    ParseResult::success(mode, items)
}

fn operand_value(token: &str, context: &dyn Context) -> Result<i64, (EvalStatus, String)> {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token
            .parse::<i64>()
            .map_err(|_| (EvalStatus::OverflowError, format!("literal too large: {token}")));
    }
    match context.get(token) {
        Some(Value::Int(v)) => Ok(*v),
        Some(other) => Err((
            EvalStatus::TypeError,
            format!("variable {token} is not an integer ({})", other.type_name()),
        )),
        None => Err((EvalStatus::NameError, format!("variable {token} not found"))),
    }
}

fn eval_expr(expr: &str, context: &dyn Context) -> Result<i64, (EvalStatus, String)> {
    let expr = expr.trim();
    if !expr_re().is_match(expr) {
        return Err((EvalStatus::SyntaxError, "invalid expression syntax".into()));
    }

    let mut tokens = token_re().find_iter(expr).map(|m| m.as_str());
    let first = tokens.next().expect("expression shape validated");
    let mut acc = operand_value(first, context)?;
    while let Some(op) = tokens.next() {
        let rhs_token = tokens.next().expect("expression shape validated");
        let rhs = operand_value(rhs_token, context)?;
        acc = match op {
            "+" => acc + rhs,
            "-" => acc - rhs,
            "*" => acc * rhs,
            "/" => {
                if rhs == 0 {
                    return Err((EvalStatus::ZeroDivisionError, "division by zero".into()));
                }
                acc / rhs
            }
            _ => unreachable!("token pattern admits four operators"),
        };
    }
    Ok(acc)
}

/// Interprets an equation's right-hand side against the context.
pub fn toy_interpret(code: &str, context: &mut dyn Context, mode: InterpretMode) -> InterpretResult {
    match eval_expr(code, context) {
        Ok(value) => InterpretResult::success(mode, Value::Int(value)),
        Err((status, message)) => InterpretResult::error(mode, status, message),
    }
}

/// Interpreter wrapper counting how often interpretation actually ran; used
/// to verify the staleness filter skips redundant work.
pub struct CountingInterpreter {
    calls: Arc<AtomicUsize>,
}

impl CountingInterpreter {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl equation_model::Interpreter for CountingInterpreter {
    fn interpret(
        &self,
        code: &str,
        context: &mut dyn Context,
        mode: InterpretMode,
    ) -> InterpretResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        toy_interpret(code, context, mode)
    }
}

pub fn new_manager() -> EquationManager {
    EquationManager::new(toy_parse, toy_interpret)
}

pub fn new_counting_manager() -> (EquationManager, Arc<AtomicUsize>) {
    let (interpreter, calls) = CountingInterpreter::new();
    (EquationManager::new(toy_parse, interpreter), calls)
}

pub fn int(manager: &EquationManager, name: &str) -> Option<i64> {
    match manager.context().get(name) {
        Some(Value::Int(v)) => Some(*v),
        _ => None,
    }
}

/// Flat record of everything the manager's signals emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Added(String),
    Removing(String),
    Updated(String, EquationFields),
    GroupAdded(GroupId),
    GroupRemoving(GroupId),
    GroupUpdated(GroupId, GroupFields),
}

pub struct SignalRecorder {
    pub events: Arc<Mutex<Vec<Event>>>,
    connections: Vec<Connection>,
}

impl SignalRecorder {
    pub fn attach(signals: &EquationSignals) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut connections = Vec::new();

        let log = events.clone();
        connections.push(signals.equation_added.connect(Box::new(move |equation| {
            log.lock().unwrap().push(Event::Added(equation.name().to_string()));
        })));
        let log = events.clone();
        connections.push(signals.equation_removing.connect(Box::new(move |equation| {
            log.lock()
                .unwrap()
                .push(Event::Removing(equation.name().to_string()));
        })));
        let log = events.clone();
        connections.push(signals.equation_updated.connect(Box::new(
            move |equation, fields| {
                log.lock()
                    .unwrap()
                    .push(Event::Updated(equation.name().to_string(), fields));
            },
        )));
        let log = events.clone();
        connections.push(signals.group_added.connect(Box::new(move |group| {
            log.lock().unwrap().push(Event::GroupAdded(group.id()));
        })));
        let log = events.clone();
        connections.push(signals.group_removing.connect(Box::new(move |group| {
            log.lock().unwrap().push(Event::GroupRemoving(group.id()));
        })));
        let log = events.clone();
        connections.push(signals.group_updated.connect(Box::new(move |group, fields| {
            log.lock()
                .unwrap()
                .push(Event::GroupUpdated(group.id(), fields));
        })));

        Self {
            events,
            connections,
        }
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
