pub mod clock;
pub mod directory;
pub mod error;
pub mod notify;
pub mod poll;
pub mod render;
pub mod results;
pub mod roster;
pub mod schedule;
pub mod targets;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use directory::{DirectoryCache, DirectorySource};
pub use error::{CoreError, UpstreamError};
pub use notify::NotificationSink;
pub use poll::{PollEngine, PollSettings};
pub use schedule::Scheduler;
