pub mod events;
pub mod logging;
pub mod runtime;

pub use events::{EventFrame, event_frames};
pub use runtime::{App, AppError};
