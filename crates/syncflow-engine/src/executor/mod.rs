//! Step execution module.

mod notification;
mod step;
mod webhook;

pub use step::{ApiMethod, StepExecutor, StepOutput};
