//! REST API endpoint modules.

pub mod notes;
pub mod status;
