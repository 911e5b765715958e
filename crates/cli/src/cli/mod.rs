pub mod args;
pub mod logging;
pub mod op;
pub mod ops;

pub use ops::{Cat, Gc, Init, Ls, Put, Version};
