//! Dispatch loops that drive an `Act` from creation to a terminal state.
//!
//! [`ExtensionDispatcher`] hands the act to a browser extension over the
//! encrypted channel and follows its progress. [`CustomActDispatcher`] runs
//! the plan-and-interpret loop itself against a [`BrowserActuator`].
//!
//! [`BrowserActuator`]: nova_act_interpreter::BrowserActuator

pub mod cancel;
pub mod custom;
pub mod dispatcher;
pub mod extension;
pub mod plan_request;
pub mod routes;
pub mod trace;

pub use cancel::{watch_ctrl_c, CancellationFlag};
pub use custom::CustomActDispatcher;
pub use dispatcher::ActDispatcher;
pub use extension::{ExtensionDispatcher, ExtensionTimings};
pub use plan_request::construct_plan_request;
pub use routes::{Routes, RoutesError, StepClient, StepResponse};
pub use trace::{LoadScroller, TraceContext, TRACE_TARGET};
