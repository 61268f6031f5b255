pub mod config;
pub mod error;
pub mod rate_limit;
pub mod types;
pub mod validate;

pub use config::{
    CacheConfig, ChainConfig, Config, Credentials, Endpoints, LISTING_NAMESPACE,
    PROFILE_NAMESPACE,
};
pub use error::{ErrorPayload, HarvestError, Result};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use types::*;
pub use validate::{is_valid_identity, normalize_resource, validate_identity};
