//! Utility modules: rate-limit retry, stream idle timeout.

pub mod retry;
pub mod timeout;

pub use retry::RetryPolicy;
pub use timeout::next_within;
