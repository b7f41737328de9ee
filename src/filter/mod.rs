//! Signal filtering: turns raw device output into trustworthy inputs for fusion.
//!
//! - `RangeFilter`: moving median over valid echoes, clamping, staleness
//! - `DetectionFilter`: confidence floor, ordering, representative selection,
//!   vision staleness
//!
//! Pure state machines: no I/O, the caller supplies every timestamp.

mod detections;
mod range;

pub use detections::{DetectionFilter, FilteredDetections};
pub use range::{FilteredRange, RangeFilter};
