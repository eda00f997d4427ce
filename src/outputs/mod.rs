//! Output generation: the merged calendar and the optional run report.
//!
//! # Submodules
//!
//! - [`ics`]: Loads the previous calendar and writes the merged one
//! - [`json`]: Writes a JSON summary of the run
//!
//! # Output Structure
//!
//! ```text
//! salam_events.ics        # append-only calendar
//! reports/last_run.json   # only with --report-json
//! ```

pub mod ics;
pub mod json;
