pub mod request;
pub mod revert_api;
pub mod types;
pub mod version_api;

pub use request::*;
pub use revert_api::*;
pub use version_api::*;
