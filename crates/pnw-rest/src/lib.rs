//! pnw-rest: the REST Client (§4.3) — rate-limited GraphQL reads, paginated
//! streaming, and the subscribe/snapshot endpoints.

pub mod client;
pub mod error;
pub mod pagination;
pub mod queries;
pub mod rate_limit;

pub use client::{RestClient, RestClientConfig};
pub use error::RestError;
pub use pagination::paginate;
pub use rate_limit::RateLimiter;
