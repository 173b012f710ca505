//! Dataset loader: authorize, fetch the first worksheet, clean.

use std::sync::Arc;

use crate::config::Config;
use crate::credentials::CredentialBundle;
use crate::error::LoadError;
use crate::records::{clean_records, ColumnMapping, Dataset, Locale};
use crate::source::{SheetTarget, SpreadsheetSource};

/// Everything the loader needs to know about the sheet besides credentials.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub target: SheetTarget,
    pub columns: ColumnMapping,
    pub locale: Locale,
}

impl LoaderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target: SheetTarget::new(&config.spreadsheet_name, config.spreadsheet_id.clone()),
            columns: config.columns.clone(),
            locale: config.locale,
        }
    }
}

pub struct DatasetLoader {
    source: Arc<dyn SpreadsheetSource>,
    settings: LoaderSettings,
}

impl DatasetLoader {
    pub fn new(source: Arc<dyn SpreadsheetSource>, settings: LoaderSettings) -> Self {
        Self { source, settings }
    }

    /// Fetch and clean the dataset with the given credentials.
    ///
    /// A sheet with only a header row (or nothing at all) is an empty
    /// dataset, not an error.
    pub async fn load(&self, bundle: &CredentialBundle) -> Result<Dataset, LoadError> {
        let session = self.source.authorize(bundle).await?;
        let worksheet = session.open_first_worksheet(&self.settings.target).await?;
        let records = session.get_all_records(&worksheet).await?;

        if records.is_empty() {
            log::info!(
                "Spreadsheet {:?} ({}) has no data rows",
                self.settings.target.name,
                worksheet.title
            );
            return Ok(Dataset::empty());
        }

        let dataset = clean_records(records, &self.settings.columns, &self.settings.locale)?;
        let stats = dataset.stats;
        log::info!(
            "Loaded {} entries from {:?} ({} fetched, {} blank, {} bad date, {} bad liters)",
            stats.kept,
            self.settings.target.name,
            stats.fetched,
            stats.blank_rows,
            stats.invalid_date,
            stats.invalid_liters
        );
        Ok(dataset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::CredentialOrigin;
    use crate::records::RawRecord;
    use crate::source::{SheetSession, Worksheet};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source serving one named spreadsheet.
    pub(crate) struct FakeSource {
        pub sheet_name: String,
        pub rows: Vec<RawRecord>,
        pub reject_auth: bool,
        pub authorizations: AtomicUsize,
    }

    impl FakeSource {
        pub fn with_rows(rows: Vec<RawRecord>) -> Self {
            Self {
                sheet_name: "Datos Lechería".to_string(),
                rows,
                reject_auth: false,
                authorizations: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.authorizations.load(Ordering::SeqCst)
        }
    }

    struct FakeSession {
        sheet_name: String,
        rows: Vec<RawRecord>,
    }

    #[async_trait]
    impl SpreadsheetSource for FakeSource {
        async fn authorize(
            &self,
            _bundle: &CredentialBundle,
        ) -> Result<Box<dyn SheetSession>, LoadError> {
            self.authorizations.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.reject_auth {
                return Err(LoadError::AuthorizationFailed("invalid_grant".to_string()));
            }
            Ok(Box::new(FakeSession {
                sheet_name: self.sheet_name.clone(),
                rows: self.rows.clone(),
            }))
        }
    }

    #[async_trait]
    impl SheetSession for FakeSession {
        async fn open_first_worksheet(&self, target: &SheetTarget) -> Result<Worksheet, LoadError> {
            if target.name != self.sheet_name {
                return Err(LoadError::SheetNotFound(target.name.clone()));
            }
            Ok(Worksheet {
                spreadsheet_id: "fake-id".to_string(),
                title: "Hoja 1".to_string(),
            })
        }

        async fn get_all_records(&self, _worksheet: &Worksheet) -> Result<Vec<RawRecord>, LoadError> {
            Ok(self.rows.clone())
        }
    }

    pub(crate) fn bundle() -> CredentialBundle {
        CredentialBundle {
            origin: CredentialOrigin::File(PathBuf::from("credenciales.json")),
            material: serde_json::Map::new(),
        }
    }

    pub(crate) fn row(cow: &str, date: &str, liters: &str) -> RawRecord {
        [("Nombre Vaca", cow), ("Fecha", date), ("Cantidad litros", liters)]
            .into_iter()
            .collect()
    }

    fn loader(source: FakeSource) -> DatasetLoader {
        DatasetLoader::new(Arc::new(source), LoaderSettings::from_config(&Config::default()))
    }

    #[tokio::test]
    async fn test_load_reference_rows() {
        let source = FakeSource::with_rows(vec![
            row("bessie ", "05/01/2024", "12.5"),
            row("   ", "06/01/2024", "3"),
            row("Luna", "31/13/2024", "8"),
        ]);

        let dataset = loader(source).load(&bundle()).await.unwrap();
        assert_eq!(dataset.len(), 1);
        let entry = &dataset.entries[0];
        assert_eq!(entry.cow_name, "Bessie");
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(entry.liters, 12.5);
        assert_eq!(dataset.stats.blank_rows, 1);
        assert_eq!(dataset.stats.invalid_date, 1);
    }

    #[tokio::test]
    async fn test_load_empty_sheet_is_empty_dataset() {
        let dataset = loader(FakeSource::with_rows(Vec::new()))
            .load(&bundle())
            .await
            .unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.stats.fetched, 0);
    }

    #[tokio::test]
    async fn test_load_wrong_sheet_name() {
        let mut source = FakeSource::with_rows(vec![row("Bessie", "05/01/2024", "12.5")]);
        source.sheet_name = "Otra Hoja".to_string();

        let err = loader(source).load(&bundle()).await.unwrap_err();
        assert!(matches!(err, LoadError::SheetNotFound(ref name) if name == "Datos Lechería"));
    }

    #[tokio::test]
    async fn test_load_authorization_failure() {
        let mut source = FakeSource::with_rows(Vec::new());
        source.reject_auth = true;

        let err = loader(source).load(&bundle()).await.unwrap_err();
        assert!(matches!(err, LoadError::AuthorizationFailed(_)));
    }

    #[tokio::test]
    async fn test_load_missing_columns() {
        let rows = vec![[("Vaca", "Bessie"), ("Fecha", "05/01/2024")]
            .into_iter()
            .collect::<RawRecord>()];

        let err = loader(FakeSource::with_rows(rows))
            .load(&bundle())
            .await
            .unwrap_err();
        match err {
            LoadError::MissingColumns { missing } => {
                assert_eq!(missing, vec!["Nombre Vaca".to_string(), "Cantidad litros".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }
}
