//! Core runtime components.
//!
//! This module contains the fundamental building blocks of the runtime,
//! including task representation, scheduling, and checkpoints.
//!
//! It is responsible for:
//! - running tasks one step at a time on a single thread,
//! - parking tasks on timers, descriptors or wakers and readmitting them,
//! - delivering cancellation at checkpoints,
//! - providing runtime context to futures running inside a task.
//!
//! Most users will interact with higher-level APIs built on top of
//! these components rather than using this module directly.

mod core;
mod timer;

pub(crate) mod builder;
pub(crate) mod checkpoint;
pub(crate) mod context;
pub(crate) mod scheduler;

pub mod lowlevel;
pub mod task;

pub use core::Runtime;
