//! Read-only milk production dashboard backed by a Google spreadsheet.
//!
//! Credentials resolve to a service-account bundle, the loader fetches and
//! cleans the first worksheet, and a TTL cache keeps the result for the
//! configured window. `summary` and `report` turn the dataset into the text
//! dashboard printed by the `milkboard` binary.

pub mod cache;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod google_api;
pub mod loader;
pub mod records;
pub mod report;
pub mod source;
pub mod summary;
