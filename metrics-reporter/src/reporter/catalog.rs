//! Reporter catalog.
//!
//! Maps the identifiers used in configuration to reporter implementations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ActiveReporter, BoundReporter, JsonLinesReporter, LogReporter, Reporter, ReporterArgs,
    ReporterError, ReporterSpec,
};
use crate::{Error, Result};

/// Starts an [`ActiveReporter`] for a registered implementation.
#[async_trait]
trait ReporterFactory: Send + Sync {
    async fn start(
        &self,
        id: &str,
        args: &ReporterArgs,
    ) -> std::result::Result<Box<dyn ActiveReporter>, ReporterError>;
}

struct Registered<R: Reporter>(Arc<R>);

#[async_trait]
impl<R: Reporter> ReporterFactory for Registered<R> {
    async fn start(
        &self,
        id: &str,
        args: &ReporterArgs,
    ) -> std::result::Result<Box<dyn ActiveReporter>, ReporterError> {
        let bound = BoundReporter::start(id, Arc::clone(&self.0), args).await?;
        Ok(Box::new(bound))
    }
}

/// Registry of reporter implementations keyed by identifier.
#[derive(Clone, Default)]
pub struct ReporterCatalog {
    factories: HashMap<String, Arc<dyn ReporterFactory>>,
}

impl ReporterCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the built-in reporters (`log`, `jsonl`).
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("log", LogReporter);
        catalog.register("jsonl", JsonLinesReporter);
        catalog
    }

    /// Register a reporter under `id`, replacing any previous entry.
    pub fn register<R: Reporter>(&mut self, id: impl Into<String>, reporter: R) -> &mut Self {
        self.register_shared(id, Arc::new(reporter))
    }

    /// Register a shared reporter under `id`.
    pub fn register_shared<R: Reporter>(
        &mut self,
        id: impl Into<String>,
        reporter: Arc<R>,
    ) -> &mut Self {
        self.factories
            .insert(id.into(), Arc::new(Registered(reporter)));
        self
    }

    /// Check if an identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Get all registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve `spec` and run the reporter's `init`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownReporter` if the identifier is not registered and
    /// `Error::ReporterInit` if `init` fails.
    pub async fn start(&self, spec: &ReporterSpec) -> Result<Box<dyn ActiveReporter>> {
        let id = spec.id();
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| Error::UnknownReporter(id.to_string()))?;

        factory
            .start(id, &spec.args())
            .await
            .map_err(|e| Error::reporter_init(id, e))
    }
}

impl fmt::Debug for ReporterCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterCatalog")
            .field("reporters", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let catalog = ReporterCatalog::with_builtins();
        assert_eq!(catalog.ids(), vec!["jsonl", "log"]);
        assert!(catalog.contains("log"));
        assert!(!catalog.contains("statsd"));
    }

    #[tokio::test]
    async fn test_start_unknown_reporter() {
        let catalog = ReporterCatalog::new();
        let result = catalog.start(&ReporterSpec::new("statsd")).await;
        assert!(matches!(result, Err(Error::UnknownReporter(id)) if id == "statsd"));
    }

    #[tokio::test]
    async fn test_start_init_failure_is_reported() {
        let catalog = ReporterCatalog::with_builtins();
        // jsonl requires a path argument
        let result = catalog.start(&ReporterSpec::new("jsonl")).await;
        match result {
            Err(Error::ReporterInit { reporter, source }) => {
                assert_eq!(reporter, "jsonl");
                assert!(matches!(source, ReporterError::InvalidArgs(_)));
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.id().to_string())),
        }
    }

    #[tokio::test]
    async fn test_start_bare_identifier() {
        let catalog = ReporterCatalog::with_builtins();
        let mut active = catalog.start(&ReporterSpec::new("log")).await.unwrap();
        assert_eq!(active.id(), "log");
        assert_eq!(active.deliver(Vec::new()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_register_replaces_entry() {
        let mut catalog = ReporterCatalog::new();
        catalog.register("sink", LogReporter);
        catalog.register("sink", JsonLinesReporter);
        assert_eq!(catalog.ids(), vec!["sink"]);

        // Now backed by the jsonl reporter, which rejects missing paths.
        let result = catalog
            .start(&ReporterSpec::with_args("sink", json!({})))
            .await;
        assert!(matches!(result, Err(Error::ReporterInit { .. })));
    }
}
