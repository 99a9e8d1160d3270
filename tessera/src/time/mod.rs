//! Time utilities.
//!
//! This module provides the runtime's view of time:
//! - [`Clock`] and its implementations [`SystemClock`] and [`MockClock`],
//! - [`sleep`], [`sleep_until`] and [`sleep_forever`],
//! - deadline helpers built on cancel scopes: [`move_on_after`],
//!   [`move_on_at`], [`fail_after`] and [`fail_at`].
//!
//! All durations are measured on the runtime's clock, never on the wall.

mod clock;
mod sleep;
mod timeout;

#[doc(inline)]
pub use clock::{Clock, MockClock, SystemClock};

#[doc(inline)]
pub use sleep::{current_time, sleep, sleep_forever, sleep_until};

#[doc(inline)]
pub use timeout::{fail_after, fail_at, move_on_after, move_on_at};
