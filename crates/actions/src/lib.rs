//! `actions` crate: the `Runnable` trait and built-in action implementations.
//!
//! Every action a target can carry is driven through [`Runnable`].
//! The engine crate dispatches execution through this trait object.

pub mod error;
pub mod traits;
pub mod command;
pub mod mock;

pub use error::ActionError;
pub use traits::{ActionContext, CapturedOutput, Outcome, Runnable};
pub use command::ExternalCommand;
