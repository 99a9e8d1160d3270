//! # Tessera
//!
//! **Tessera** is a single-threaded, cooperative async runtime built around
//! structured concurrency.
//!
//! Every task belongs to a [`Nursery`], and a nursery does not return until
//! all of its children have finished. Cancellation is expressed with
//! [`CancelScope`]s: cancelling a scope makes every task inside it fail with
//! [`Cancelled`] at its next checkpoint, and the scope catches its own
//! cancellation on the way out. Nothing is ever cancelled in the middle of a
//! step.
//!
//! It offers:
//!
//! - **Nurseries** ([`open_nursery`]) that join their children and turn
//!   failures into a single error or a [`FailureGroup`]
//! - **Cancel scopes** with deadlines and shields, plus the timeout helpers
//!   [`move_on_after`] and [`fail_after`]
//! - **Checkpoints** ([`checkpoint`], [`checkpoint_if_cancelled`]) where
//!   cancellation is delivered
//! - **Instruments** ([`instrument::Instrument`]) observing scheduler
//!   transitions, costing nothing when no instrument listens
//! - **Producers** ([`producer`]) whose cleanup runs when the task that
//!   created them exits
//! - **A mock clock** ([`time::MockClock`]) for deterministic tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! #[tessera::main]
//! async fn main() -> tessera::Result<()> {
//!     tessera::open_nursery(|nursery| async move {
//!         nursery.spawn_named("slow", async {
//!             tessera::sleep(Duration::from_secs(10)).await
//!         })?;
//!
//!         let done = tessera::move_on_after(Duration::from_millis(100), async {
//!             tessera::sleep(Duration::from_secs(1)).await
//!         })
//!         .await?;
//!         assert!(done.is_none());
//!
//!         nursery.cancel_scope().cancel();
//!         Ok(())
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`instrument`]: scheduler observers
//! - [`io`]: the I/O wait adapter and descriptor readiness
//! - [`lowlevel`]: scheduler introspection
//! - [`time`]: clocks, sleeping and deadlines

// Lets `#[tessera::instrument]` expand inside this crate.
extern crate self as tessera;

mod cancel;
mod error;
mod nursery;
mod producer;
mod runtime;

pub mod instrument;
pub mod io;
pub mod time;

pub use cancel::{CancelScope, ScopeId};
pub use error::{Cancelled, Error, FailureGroup, FinalizeError, Result};
pub use nursery::{Nursery, open_nursery};
pub use producer::{Emit, Next, Producer, ProducerState, Yielder, producer};
pub use runtime::Runtime;
pub use runtime::builder::RuntimeBuilder;
pub use runtime::checkpoint::{checkpoint, checkpoint_if_cancelled};
pub use runtime::lowlevel;
pub use runtime::task::{TaskId, TaskInfo};

pub use io::{wait_readable, wait_writable};
pub use time::{
    current_time, fail_after, fail_at, move_on_after, move_on_at, sleep, sleep_forever,
    sleep_until,
};

pub use tessera_macros::*;
