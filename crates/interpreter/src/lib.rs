//! AWL program parsing and execution against a browser actuator.
//!
//! The planner answers each step with a short program: one action statement,
//! optionally preceded by a `think("...")` note. [`parse_program`] turns the
//! text into a typed [`Program`] without side effects; [`AwlInterpreter`]
//! applies it to a [`BrowserActuator`].

pub mod actuator;
pub mod bbox;
pub mod interpreter;
pub mod parser;

pub use actuator::{ActuatorError, BrowserActuator, BrowserObservation, SettleOptions};
pub use bbox::BoundingBox;
pub use interpreter::{AwlInterpreter, Interpretation, ProgramError};
pub use parser::{parse_program, tokenize, Action, ParseError, Program, Statement};
