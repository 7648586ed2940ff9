//! Execution transaction submission with gas estimation

mod gas;
mod sender;

pub use sender::SafeExecutor;
