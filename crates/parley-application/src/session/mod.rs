//! Session windows and per-session runtimes.
//!
//! # Module Structure
//!
//! - `window_manager`: `SessionWindowManager`, the bounded visible set
//! - `runtime`: `SessionRuntime` bundling pipeline, billing and feed pump
//! - `throttle`: `RefreshThrottle` coalescing of refresh requests

mod runtime;
mod throttle;
mod window_manager;

pub use runtime::{SessionRuntime, SessionView};
pub use throttle::RefreshThrottle;
pub use window_manager::{
    AcceptOutcome, NoticeKind, RefreshOutcome, RefreshReport, SessionWindowManager, StepOutcome,
    VisibleWindow, WindowNotice,
};
