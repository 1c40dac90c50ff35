//! Request quotas.
//!
//! - [`RequestLimiter`] counts actions per `(entity, identifier)` in a
//!   [`KeyValueStore`](crate::cache::KeyValueStore) and answers whether an
//!   identifier is still within its quota.
//! - [`VisitorLimiter`] is an in-process token bucket per key, used for
//!   per-IP throttling.

mod counter;
mod visitor;

pub use counter::{EntityLimiter, Quota, RequestLimiter};
pub use visitor::VisitorLimiter;
