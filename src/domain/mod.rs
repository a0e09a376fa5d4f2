pub mod action;
pub mod battery;
pub mod types;

pub use action::*;
pub use battery::*;
pub use types::*;
