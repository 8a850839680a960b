//! Data models

pub mod feature;
pub mod prediction;
pub mod user;

pub use feature::*;
pub use prediction::*;
pub use user::*;
