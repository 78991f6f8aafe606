//! reqline: an asynchronous I/O request lifecycle manager.
//!
//! A [`RequestTarget`] submits read, write, and device-control requests to
//! a pluggable [`IoTarget`], tracks in-flight requests so they can be
//! cancelled safely, hands out pre-created reusable request handles, and
//! dispatches completion results either inline or on a deferred work queue.
//!
//! # Architecture
//!
//! - Request handles ([`Request`]) are `Arc`-shared; the clone held in the
//!   pending table keeps a handle alive across a racing cancel.
//! - Cancel and reuse cookies ([`CancelId`], [`ReuseId`]) come from one
//!   process-wide monotonic counter, so a stale cookie can never match a
//!   recycled handle.
//! - Completion bookkeeping lives in a fixed-size context pool acquired at
//!   send time, so the completion path never allocates.
//! - Teardown is gated: [`RequestTarget::shutdown`] refuses new work and
//!   waits for every outstanding send, cancel, and completion to finish.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::{Bytes, BytesMut};
//! use reqline::{
//!     CompletionParams, Config, Error, IoTarget, Request, RequestKind, RequestTarget,
//! };
//!
//! /// Test target that echoes the input payload into the output buffer.
//! struct Loopback;
//!
//! impl IoTarget for Loopback {
//!     fn submit(&self, request: &Arc<Request>, _timeout: Option<Duration>) -> Result<(), Error> {
//!         let params = self.submit_sync(request, None);
//!         request.complete(params);
//!         Ok(())
//!     }
//!
//!     fn submit_sync(
//!         &self,
//!         request: &Arc<Request>,
//!         _timeout: Option<Duration>,
//!     ) -> CompletionParams {
//!         let echoed = match request.input() {
//!             Some(input) => request.write_output(&input),
//!             None => 0,
//!         };
//!         CompletionParams {
//!             status: 0,
//!             bytes_transferred: echoed,
//!         }
//!     }
//!
//!     fn cancel(&self, _request: &Arc<Request>) -> bool {
//!         false
//!     }
//! }
//!
//! let pipeline = RequestTarget::new(Config::default())?;
//! pipeline.set_target(Arc::new(Loopback));
//!
//! let reply = pipeline.send_sync(
//!     RequestKind::Ioctl(0x1),
//!     Some(Bytes::from_static(b"ping")),
//!     Some(BytesMut::with_capacity(64)),
//!     None,
//! )?;
//! assert_eq!(reply.bytes_transferred, 4);
//! assert_eq!(&reply.output.unwrap()[..], b"ping");
//! # Ok::<(), reqline::Error>(())
//! ```

mod context_pool;
mod counter;
mod dispatcher;
mod error;
mod gate;
mod metrics;
mod registry;
mod request;
mod request_target;
mod target;
mod token;
mod workqueue;

// ── Pipeline ─────────────────────────────────────────────────────

pub use request_target::Config;
pub use request_target::RequestTarget;
pub use request_target::SyncCompletion;

// ── Requests and targets ─────────────────────────────────────────

pub use request::CompletionParams;
pub use request::Request;
pub use request::RequestKind;
pub use target::IoTarget;

// ── Completion dispatch ──────────────────────────────────────────

pub use dispatcher::Completion;
pub use dispatcher::CompletionOption;
pub use dispatcher::SendCompletion;

// ── Cookies and errors ───────────────────────────────────────────

pub use error::Error;
pub use token::CancelId;
pub use token::ReuseId;
