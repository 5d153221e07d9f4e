//! Conflict annotation.
//!
//! After a three-way merge leaves conflicting regions in a note, the
//! annotator tags the begin/separator/end marker lines of every well-formed
//! region with an out-of-band token so clients can locate them without
//! confusing them with user text.

pub mod annotator;

pub use annotator::{annotate, Annotated, ConflictAnnotator, ConflictRegion};
