//! Startup orchestration.
//!
//! # Responsibilities
//! - Acquire worker-lifetime resources (the signature classifier handle)
//! - Install the response filter chain exactly once
//! - Release worker resources when the worker context is dropped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The chain does not depend on any route's toggle; toggles are read per request

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::filter::{
    ChainError, Classifier, ExtensionTable, FilterChain, GuessMimeFilter, InferClassifier,
};
use crate::security::NoSniffFilter;

/// Resources owned by one worker process for its whole lifetime.
pub struct WorkerContext {
    classifier: Option<Arc<dyn Classifier>>,
}

impl WorkerContext {
    /// Initialise worker resources from config.
    pub fn start(config: &ServerConfig) -> Self {
        let classifier: Option<Arc<dyn Classifier>> = if config.classifier.enabled {
            tracing::info!("Signature classifier initialized");
            Some(Arc::new(InferClassifier::new()))
        } else {
            tracing::warn!("Signature classifier disabled, inference limited to the type table");
            None
        };
        Self { classifier }
    }

    /// Build a worker context around an existing classifier.
    pub fn with_classifier(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        self.classifier.clone()
    }

    /// Compose the response filter chain, outermost first.
    pub fn install_filters(&self, config: &ServerConfig) -> Result<FilterChain, ChainError> {
        let table = ExtensionTable::with_overrides(config.types.iter());
        let chain = FilterChain::builder()
            .filter(GuessMimeFilter::new(Arc::new(table), self.classifier()))
            .filter(NoSniffFilter)
            .build()?;

        tracing::info!(filters = ?chain.names(), "Response filter chain installed");
        Ok(chain)
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        if self.classifier.take().is_some() {
            tracing::info!("Signature classifier released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_installed_regardless_of_toggle() {
        let mut config = ServerConfig::default();
        assert!(!config.filter.guess_mime);

        let worker = WorkerContext::start(&config);
        let chain = worker.install_filters(&config).unwrap();
        assert_eq!(chain.names(), vec![GuessMimeFilter::NAME, NoSniffFilter::NAME]);

        config.filter.guess_mime = true;
        assert_eq!(worker.install_filters(&config).unwrap().len(), 2);
    }

    #[test]
    fn test_classifier_can_be_disabled() {
        let mut config = ServerConfig::default();
        config.classifier.enabled = false;
        assert!(WorkerContext::start(&config).classifier().is_none());
    }
}
