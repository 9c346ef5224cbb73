pub mod config;
pub mod dispatcher;
pub mod error;
pub mod notification;
pub mod registry;
pub mod runner;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{HookError, Result};
pub use notification::{EventKind, Notification};
pub use runner::{ActionReport, ActionRunner, ScriptRunner};
