mod group;
mod id;

pub use group::{GroupById, Pluck};
pub use id::Id;
