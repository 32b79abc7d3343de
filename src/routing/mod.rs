//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request + MakeRequestOptions
//!     → router.rs (strip explicit or mounted prefix)
//!     → matcher.rs (pathname → route id + params)
//!     → middleware chain around the route handler (or not-found handler)
//!     → Response
//!
//! Route Compilation (at bundle load):
//!     route ids ("/users/[id]", "/files/[...path]")
//!     → parse patterns
//!     → sort by specificity (static > dynamic > wildcard, then declaration order)
//!     → freeze as immutable RouteBundle
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod params;
pub mod router;

pub use matcher::{PatternError, PatternMatcher, RouteMatch, RouteMatcher, RoutePattern};
pub use params::{RouteParam, RouteParams};
pub use router::{ConfigurationError, DispatchError, MakeRequestOptions, RouteBundle, RouteBundleBuilder};
