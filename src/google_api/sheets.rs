//! Google Drive v3 + Sheets v4: spreadsheet lookup and row fetching.
//!
//! Drive finds the spreadsheet by its display name; Sheets returns the first
//! worksheet's title and its values. Rows come back as formatted text, the
//! same way they appear in the browser.

use async_trait::async_trait;
use serde::Deserialize;

use super::auth::{fetch_access_token, key_from_material, AccessToken};
use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy};
use crate::credentials::CredentialBundle;
use crate::error::LoadError;
use crate::records::{RawRecord, RawValue};
use crate::source::{SheetSession, SheetTarget, SpreadsheetSource, Worksheet};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    title: String,
    #[serde(default)]
    index: i64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

// ============================================================================
// Source + session
// ============================================================================

/// Production [`SpreadsheetSource`] backed by the Google REST APIs.
pub struct GoogleSheetsSource {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GoogleSheetsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl SpreadsheetSource for GoogleSheetsSource {
    async fn authorize(&self, bundle: &CredentialBundle) -> Result<Box<dyn SheetSession>, LoadError> {
        let key = key_from_material(&bundle.material).map_err(|e| {
            LoadError::AuthorizationFailed(format!("{} ({})", e, bundle.origin))
        })?;
        let token = fetch_access_token(&self.client, &key, &self.retry)
            .await
            .map_err(LoadError::from_auth)?;

        log::info!("Authorized as {}", key.client_email);
        Ok(Box::new(GoogleSheetSession {
            client: self.client.clone(),
            token,
            retry: self.retry.clone(),
        }))
    }
}

struct GoogleSheetSession {
    client: reqwest::Client,
    token: AccessToken,
    retry: RetryPolicy,
}

impl GoogleSheetSession {
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GoogleApiError> {
        let request = request.bearer_auth(&self.token.token);
        let resp = send_with_retry(request, &self.retry).await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Drive search by exact display name. `None` when nothing matches.
    async fn find_by_name(&self, name: &str) -> Result<Option<String>, GoogleApiError> {
        let request = self.client.get(DRIVE_FILES_URL).query(&[
            ("q", drive_name_query(name).as_str()),
            ("fields", "files(id,name)"),
            ("pageSize", "10"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        let list: DriveFileList = self.get_json(request).await?;

        if list.files.len() > 1 {
            log::warn!(
                "{} spreadsheets named {:?}; using the first ({})",
                list.files.len(),
                name,
                list.files[0].id
            );
        }
        Ok(list.files.into_iter().next().map(|f| {
            log::debug!("Resolved spreadsheet {:?} -> {}", f.name, f.id);
            f.id
        }))
    }

    async fn first_sheet_title(&self, spreadsheet_id: &str) -> Result<Option<String>, GoogleApiError> {
        let url = sheets_url(spreadsheet_id, &[])?;
        let request = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties(title,index)")]);
        let meta: SpreadsheetMeta = self.get_json(request).await?;
        Ok(first_sheet(meta))
    }
}

#[async_trait]
impl SheetSession for GoogleSheetSession {
    async fn open_first_worksheet(&self, target: &SheetTarget) -> Result<Worksheet, LoadError> {
        let lookup = self.find_by_name(&target.name).await;
        let spreadsheet_id = pick_spreadsheet_id(lookup, target)?;

        let title = self
            .first_sheet_title(&spreadsheet_id)
            .await
            .map_err(|e| LoadError::from_fetch(&target.name, e))?
            .ok_or_else(|| LoadError::SheetNotFound(format!("{} (no worksheets)", target.name)))?;

        Ok(Worksheet {
            spreadsheet_id,
            title,
        })
    }

    async fn get_all_records(&self, worksheet: &Worksheet) -> Result<Vec<RawRecord>, LoadError> {
        let range = quote_sheet_title(&worksheet.title);
        let url = sheets_url(&worksheet.spreadsheet_id, &["values", range.as_str()])
            .map_err(|e| LoadError::from_fetch(&worksheet.title, e))?;
        let request = self.client.get(url).query(&[
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "FORMATTED_VALUE"),
        ]);

        let values: ValueRange = self
            .get_json(request)
            .await
            .map_err(|e| LoadError::from_fetch(&worksheet.title, e))?;

        let records = records_from_values(values.values);
        log::debug!(
            "Fetched {} rows from {}!{}",
            records.len(),
            worksheet.spreadsheet_id,
            worksheet.title
        );
        Ok(records)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decide which spreadsheet to open from the Drive name lookup.
///
/// A name hit wins. A miss, or a Drive 403/404 (Drive may be unavailable to
/// the account), falls back to the configured id when there is one.
fn pick_spreadsheet_id(
    lookup: Result<Option<String>, GoogleApiError>,
    target: &SheetTarget,
) -> Result<String, LoadError> {
    let by_name = match lookup {
        Ok(found) => found,
        Err(GoogleApiError::ApiError { status, message })
            if (status == 403 || status == 404) && target.id.is_some() =>
        {
            log::warn!(
                "Drive lookup for {:?} failed ({}: {}); falling back to configured id",
                target.name,
                status,
                message
            );
            None
        }
        Err(e) => return Err(LoadError::from_fetch(&target.name, e)),
    };

    match (by_name, target.id.as_deref()) {
        (Some(id), _) => Ok(id),
        (None, Some(id)) => {
            log::info!("No spreadsheet named {:?}; using id {}", target.name, id);
            Ok(id.to_string())
        }
        (None, None) => Err(LoadError::SheetNotFound(target.name.clone())),
    }
}

/// Drive `q` expression matching a spreadsheet by exact name.
fn drive_name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME
    )
}

/// A1 range for a whole sheet: `'Sheet Title'`, with embedded quotes doubled.
fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn sheets_url(spreadsheet_id: &str, extra: &[&str]) -> Result<url::Url, GoogleApiError> {
    let mut url = url::Url::parse(SHEETS_BASE_URL)
        .map_err(|e| GoogleApiError::InvalidRequest(format!("bad base url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| GoogleApiError::InvalidRequest("base url cannot hold a path".into()))?
        .push(spreadsheet_id)
        .extend(extra);
    Ok(url)
}

fn first_sheet(meta: SpreadsheetMeta) -> Option<String> {
    meta.sheets
        .into_iter()
        .min_by_key(|s| s.properties.index)
        .map(|s| s.properties.title)
}

/// First row is the header; each later row becomes a record with one field per
/// header. Short rows are padded with `Empty`, cells past the header are ignored.
fn records_from_values(values: Vec<Vec<serde_json::Value>>) -> Vec<RawRecord> {
    let mut rows = values.into_iter();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row
        .into_iter()
        .map(|v| RawValue::from(v).as_text())
        .collect();

    rows.map(|row| {
        let mut cells = row.into_iter();
        let mut record = RawRecord::new();
        for header in &headers {
            let value = cells.next().map(RawValue::from).unwrap_or(RawValue::Empty);
            record.push(header.clone(), value);
        }
        record
    })
    .collect()
}
