pub mod change;
pub mod diff;
pub mod references;
pub mod revert;
pub mod selection;
pub mod traits;
pub mod version;
pub mod workflow;
