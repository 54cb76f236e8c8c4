//! Failsafe mechanisms for outbound eBay calls

mod retry;

pub use retry::{Attempt, RetryPolicy, with_retry};
