//! Dashboard state: resolve credentials, load through the cache, classify.

use std::sync::Arc;

use crate::cache::{Clock, DatasetCache};
use crate::config::Config;
use crate::credentials::{self, CredentialContext};
use crate::error::{ErrorKind, LoadError};
use crate::loader::DatasetLoader;
use crate::records::Dataset;

/// What the presentation layer should show.
#[derive(Debug, Clone)]
pub enum DashboardState {
    Ready(Arc<Dataset>),
    /// Loaded fine, but no valid entries.
    Empty,
    NoCredentials(String),
    FetchFailed(LoadError),
}

pub type ContextProvider = Box<dyn Fn() -> CredentialContext + Send + Sync>;

pub struct HerdDashboard {
    loader: DatasetLoader,
    cache: DatasetCache,
    context: ContextProvider,
}

impl HerdDashboard {
    /// Production wiring: system clock, credentials read from the process
    /// environment on every cache miss.
    pub fn new(loader: DatasetLoader, config: &Config) -> Self {
        let config = config.clone();
        Self::with_parts(
            loader,
            DatasetCache::new(config.cache_ttl()),
            Box::new(move || CredentialContext::from_env(&config)),
        )
    }

    pub fn with_parts(loader: DatasetLoader, cache: DatasetCache, context: ContextProvider) -> Self {
        Self {
            loader,
            cache,
            context,
        }
    }

    /// Test hook for a dashboard with a fixed credential context.
    pub fn with_context(
        loader: DatasetLoader,
        ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
        context: CredentialContext,
    ) -> Self {
        Self::with_parts(
            loader,
            DatasetCache::with_clock(ttl, clock),
            Box::new(move || context.clone()),
        )
    }

    /// The cached dataset, fetching it when the window has lapsed.
    pub async fn dataset(&self) -> Result<Arc<Dataset>, LoadError> {
        self.cache
            .get_or_try_fill(|| async {
                let bundle = credentials::resolve(&(self.context)())?;
                self.loader.load(&bundle).await
            })
            .await
    }

    pub async fn refresh(&self) -> DashboardState {
        match self.dataset().await {
            Ok(dataset) if dataset.is_empty() => DashboardState::Empty,
            Ok(dataset) => DashboardState::Ready(dataset),
            Err(err) => {
                log::warn!("Dashboard load failed: {}", err);
                match err.kind() {
                    ErrorKind::NoCredentials => DashboardState::NoCredentials(err.to_string()),
                    ErrorKind::FetchFailed => DashboardState::FetchFailed(err),
                }
            }
        }
    }

    /// Drop the cached dataset; the next `refresh` refetches.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::loader::tests::{row, FakeSource};
    use crate::loader::LoaderSettings;
    use std::path::PathBuf;
    use std::time::Duration;

    fn secret_context() -> CredentialContext {
        CredentialContext {
            env_key: "GCP_SERVICE_ACCOUNT".to_string(),
            env_secret: Some(r#"{"type": "service_account", "client_email": "a@b"}"#.to_string()),
            local_path: PathBuf::from("/nonexistent/credenciales.json"),
        }
    }

    fn dashboard(source: Arc<FakeSource>, context: CredentialContext) -> (HerdDashboard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let loader = DatasetLoader::new(source, LoaderSettings::from_config(&Config::default()));
        let dashboard =
            HerdDashboard::with_context(loader, Duration::from_secs(60), clock.clone(), context);
        (dashboard, clock)
    }

    #[tokio::test]
    async fn test_refresh_ready_and_cached() {
        let source = Arc::new(FakeSource::with_rows(vec![row("Bessie", "05/01/2024", "12.5")]));
        let (dashboard, clock) = dashboard(source.clone(), secret_context());

        assert!(matches!(dashboard.refresh().await, DashboardState::Ready(ref d) if d.len() == 1));
        clock.advance(Duration::from_secs(30));
        assert!(matches!(dashboard.refresh().await, DashboardState::Ready(_)));
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::from_secs(31));
        dashboard.refresh().await;
        assert_eq!(source.calls(), 2);

        dashboard.invalidate();
        dashboard.refresh().await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_empty_sheet() {
        let source = Arc::new(FakeSource::with_rows(vec![row("", "", "")]));
        let (dashboard, _clock) = dashboard(source, secret_context());
        assert!(matches!(dashboard.refresh().await, DashboardState::Empty));
    }

    #[tokio::test]
    async fn test_refresh_without_credentials() {
        let source = Arc::new(FakeSource::with_rows(Vec::new()));
        let context = CredentialContext {
            env_secret: None,
            ..secret_context()
        };
        let (dashboard, _clock) = dashboard(source.clone(), context);

        match dashboard.refresh().await {
            DashboardState::NoCredentials(msg) => assert!(msg.contains("GCP_SERVICE_ACCOUNT")),
            other => panic!("expected NoCredentials, got {other:?}"),
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_fetch_failure_is_not_cached() {
        let mut failing = FakeSource::with_rows(Vec::new());
        failing.sheet_name = "Otra Hoja".to_string();
        let source = Arc::new(failing);
        let (dashboard, _clock) = dashboard(source.clone(), secret_context());

        assert!(matches!(
            dashboard.refresh().await,
            DashboardState::FetchFailed(LoadError::SheetNotFound(_))
        ));
        dashboard.refresh().await;
        assert_eq!(source.calls(), 2);
    }
}
