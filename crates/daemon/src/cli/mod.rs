pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Cleanup, Dismiss, Init, Messages, Propose, Query, Summary, Version};
