// Resilience primitives wrapping subprocess-backed provider calls

pub mod breaker;
pub mod cache;
pub mod limiter;
pub mod retry;
pub mod timeout;

#[cfg(test)]
mod tests;

pub use breaker::{CircuitBreaker, CircuitState};
pub use cache::TtlCache;
pub use limiter::RateLimiter;
pub use retry::{with_retry, RetryConfig};
pub use timeout::with_timeout;
