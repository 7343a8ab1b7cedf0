//! Scanner lifecycle controller
//!
//! Turns start, stop and switch intents into camera open/close operations,
//! serialised so that at most one camera session exists at any time. The
//! rendered view observes [`ScannerSnapshot`]s published after every
//! transition.

mod actor;
mod builder;
mod handle;
mod state;

pub use builder::ScannerControllerBuilder;
pub use handle::ScannerHandle;
pub use state::{ControllerState, Disposition, ScannerSnapshot};
