//! HTTP surfaces: the public proxy listener and the admin listener.

mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use middleware::RequestContext;
pub use public::{PublicState, build_router};

/// Request header carrying the tenant selector, set by the fronting proxy.
pub const SELECTOR_HEADER: &str = "x-magicbox-resource";
/// Response header reporting whether the body came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-magicbox";
