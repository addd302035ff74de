//! fleetshim-router: the data path.
//!
//! - [`ReadRouter`] tries an ordered list of read candidates (replica,
//!   then primary) and reports which one answered.
//! - [`WritePath`] sends every write to the primary.

pub mod error;
pub mod read;
pub mod write;

pub use error::RouteError;
pub use read::{ReadCandidate, ReadOutcome, ReadRouter};
pub use write::{NewEntry, WritePath};
