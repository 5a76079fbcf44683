pub mod admission;
pub mod rate_limit;

pub use admission::{AdmissionGuard, TokenValidator};
pub use rate_limit::RateLimiter;
