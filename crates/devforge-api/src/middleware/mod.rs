//! Cross-cutting HTTP middleware
//!
//! Author: hephaex@gmail.com

pub mod rate_limit;
pub mod request_log;
pub mod security_headers;

pub use rate_limit::{rate_limit, RateLimitDecision, RateLimiter};
pub use request_log::request_log;
pub use security_headers::security_headers;
