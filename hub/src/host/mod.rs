//! The host application: where it lives and whether it is running

pub mod locator;
pub mod process_guard;

pub use locator::{HostLocator, NoPrompt, OperatorPrompt};
pub use process_guard::{ProcessProbe, SystemProcessProbe};
