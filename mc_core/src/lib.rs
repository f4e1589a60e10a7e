//! ABOUTME: Core error type, clock, session ids, and tracing utilities
//! ABOUTME: Foundation crate used by every other motioncam component

pub mod error;
pub mod id;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use id::SessionId;
pub use time::{timestamp_label, Clock, ManualClock, SystemClock};
