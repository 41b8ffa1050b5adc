pub mod candidate;
pub mod connection;
pub mod endpoints;
pub mod retry;

pub use connection::{ApiConnectionError, GeminiClient};
pub use retry::{fetch_with_retry, RetryPolicy, Sleeper, TokioSleeper};
