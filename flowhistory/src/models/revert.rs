pub mod events;
pub mod queue;
pub mod resolver;
pub mod session;

pub use events::{FailurePolicy, QueueState, RevertEvent};
pub use queue::{QueueKey, RevertQueue, RevertRun};
pub use session::RevertSession;
