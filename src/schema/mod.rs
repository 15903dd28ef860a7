//! Row shapes exchanged with the storage collaborator
//!
//! The hourly feed carries nine positional fields per row. The daily feed and
//! manual entries carry one row per date. All three accept either JSON arrays
//! (positional) or JSON objects (named), and tolerate numbers written as
//! strings, which is how tabular stores usually hand them back.

pub(crate) mod lenient;
mod reader;
mod row;

pub use reader::{parse_json_rows, parse_ndjson_rows};
pub use row::{DailyFeedRow, HourlyRow, ManualEntry};
