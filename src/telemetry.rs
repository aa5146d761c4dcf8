//! Structured events for quota fetching.
//!
//! The fetcher, engine and query service describe what they do as
//! [`FetchEvent`]s and hand them to a sink. Sinks are `tower::Service`s so
//! they compose with ordinary tower combinators; the components store them
//! type-erased as a [`BoxedSink`].
//!
//! Emission is best effort: a sink that is not ready or fails simply loses the
//! event.
//!
//! ```rust
//! use quotascope::telemetry::{boxed, emit_best_effort, FetchEvent, MemorySink};
//!
//! # tokio_test_block(async {
//! let memory = MemorySink::new();
//! emit_best_effort(boxed(memory.clone()), FetchEvent::CacheMiss { key: "regions".into() }).await;
//! assert_eq!(memory.len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod events;
pub mod sinks;

pub use events::{event_to_json, FetchEvent};
pub use sinks::{
    boxed, emit_best_effort, BoxError, BoxedSink, LogSink, MemorySink, MulticastSink,
    NonBlockingSink, NullSink, TelemetrySink,
};

/// Sink used when the caller configures none.
pub fn null_sink() -> BoxedSink {
    boxed(NullSink)
}
