//! Caller-initiated cancellation of pipeline runs.
//!
//! A [`CancellationToken`] is shared between the caller and a running
//! pipeline. The pipeline races each executor call against
//! [`CancellationToken::cancelled`], so cancelling drops the in-flight call
//! instead of waiting for it to return.

mod token;

pub use token::CancellationToken;
