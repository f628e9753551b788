//! Request throttling primitives shared by the fetch and download pipelines.
//!
//! Two independent controls compose here:
//! - [`RateLimiter`] serializes request *issuance* to at most one per fixed
//!   interval, regardless of how many tasks are in flight.
//! - [`ConcurrencyGate`] bounds how many operations may be *in flight*
//!   simultaneously, regardless of how fast they were issued.

mod gate;
mod rate;

pub use gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use rate::{DEFAULT_WAIT_TIMEOUT, RateError, RateLimiter};
