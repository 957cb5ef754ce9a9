pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Cell, Daemon, Health, Init, Version};
