//! Recording session orchestration
//!
//! - `state` — status, configuration, snapshot, and event types
//! - `clock` — monotonic duration accounting
//! - `session` — the state machine owning sources, mixer, compositor,
//!   and encoder
//! - `publisher` — the narrow read/command surface for UI collaborators

pub mod clock;
pub mod publisher;
pub mod session;
pub mod state;

pub use clock::DurationClock;
pub use publisher::{SessionCommand, SessionPublisher};
pub use session::RecordingSession;
pub use state::{RecordingEvent, RecordingStatus, SessionConfig, SessionSnapshot};
