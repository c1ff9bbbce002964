#![forbid(unsafe_code)]

//! Shared contracts for the equation engine.
//!
//! The engine itself never parses or interprets the host scripting language;
//! it talks to the outside world through three seams defined here:
//!
//! - [`Parser`] turns a textual statement into named [`ParseItem`]s,
//! - [`Interpret`](Interpreter) executes an item's code against a [`Context`],
//! - [`Value`] is the dynamically-typed result container stored in a context.
//!
//! Adapters implementing these traits live outside the engine (e.g. a Python
//! binding); the test suites ship a toy arithmetic implementation.

mod context;
mod interpret;
mod parse;
mod status;
mod value;

pub use context::Context;
pub use interpret::{InterpretMode, InterpretResult, Interpreter};
pub use parse::{ItemKind, ParseItem, ParseMode, ParseResult, Parser, EXPRESSION_ITEM_NAME};
pub use status::EvalStatus;
pub use value::Value;
