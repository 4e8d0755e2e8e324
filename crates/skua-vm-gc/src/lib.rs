//! # Skua VM Garbage Collector
//!
//! Stop-the-world mark/sweep collector over a handle arena.
//!
//! ## Design
//!
//! - **Handles**: cells are addressed by [`GcRef`] (slot index plus generation), so a
//!   stale handle is detected instead of aliasing a reused slot
//! - **Precise tracing**: every cell type describes its outgoing references via [`Trace`]
//! - **Safe points**: collection only runs when the embedder passes a complete root set

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod collector;
pub mod error;
pub mod finalization;
pub mod heap;
pub mod object;
pub mod roots;

pub use collector::GcStats;
pub use error::GcError;
pub use finalization::FinalizationRegistry;
pub use heap::{GcConfig, Heap};
pub use object::{GcRef, MarkColor, Trace};
pub use roots::PersistentRoots;
