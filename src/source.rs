//! The seam between the loader and whatever serves spreadsheet rows.
//!
//! Production uses [`crate::google_api::sheets::GoogleSheetsSource`]; tests
//! plug in in-memory fakes.

use async_trait::async_trait;

use crate::credentials::CredentialBundle;
use crate::error::LoadError;
use crate::records::RawRecord;

/// Which spreadsheet to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    /// Display name, looked up first.
    pub name: String,
    /// Stable id, used when the name lookup comes back empty.
    pub id: Option<String>,
}

impl SheetTarget {
    pub fn new(name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// An opened worksheet inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worksheet {
    pub spreadsheet_id: String,
    pub title: String,
}

/// Turns a credential bundle into an authorized session.
#[async_trait]
pub trait SpreadsheetSource: Send + Sync {
    /// Failures here are `AuthorizationFailed` (or transient, if the token
    /// endpoint could not be reached).
    async fn authorize(&self, bundle: &CredentialBundle) -> Result<Box<dyn SheetSession>, LoadError>;
}

/// An authorized connection to the spreadsheet service.
#[async_trait]
pub trait SheetSession: Send + Sync {
    /// Open the target spreadsheet and select its first worksheet.
    async fn open_first_worksheet(&self, target: &SheetTarget) -> Result<Worksheet, LoadError>;

    /// All data rows keyed by the header row. No rows is `Ok(vec![])`.
    async fn get_all_records(&self, worksheet: &Worksheet) -> Result<Vec<RawRecord>, LoadError>;
}
