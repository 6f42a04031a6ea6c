//! Long-lived engine owning the knowledge base and worker pool.

use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::db::{Database, DbError, KnowledgeDataset};
use crate::kb::{KbError, KbStatistics, KnowledgeBase};
use crate::models::{BatchReport, LabMeasurement, PatientContext, ResolutionRequest, Test};
use crate::resolver::Resolver;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KbError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Resolves batches against one immutable knowledge base.
pub struct LabEngine {
    kb: KnowledgeBase,
    config: EngineConfig,
    pool: Option<rayon::ThreadPool>,
}

impl LabEngine {
    /// Create an engine over a loaded knowledge base.
    pub fn new(kb: KnowledgeBase, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let pool = if config.is_parallel() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("labref-worker-{}", i))
                .build()?;
            tracing::info!(threads = config.worker_threads, "Using parallel batch resolution");
            Some(pool)
        } else {
            None
        };

        Ok(Self { kb, config, pool })
    }

    /// Open a SQLite knowledge base.
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> EngineResult<Self> {
        let db = Database::open(path)?;
        let kb = KnowledgeBase::load(&db)?;
        Self::new(kb, config)
    }

    /// Import a JSON dataset into an in-memory database and serve it.
    pub fn from_dataset_json(json: &str, config: EngineConfig) -> EngineResult<Self> {
        let dataset = KnowledgeDataset::from_json(json)?;
        let db = Database::open_in_memory()?;
        db.import_dataset(&dataset)?;
        let kb = KnowledgeBase::load(&db)?;
        Self::new(kb, config)
    }

    /// A resolver borrowing this engine's knowledge base.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::with_config(&self.kb, self.config.confidence.clone())
    }

    /// Resolve one report.
    ///
    /// Output order matches input order whether or not the pool is used.
    pub fn resolve_batch(
        &self,
        measurements: &[LabMeasurement],
        patient: &PatientContext,
    ) -> BatchReport {
        let resolver = self.resolver();
        let results = match &self.pool {
            Some(pool) => pool.install(|| {
                measurements
                    .par_iter()
                    .map(|m| resolver.resolve_one(m, patient))
                    .collect()
            }),
            None => measurements
                .iter()
                .map(|m| resolver.resolve_one(m, patient))
                .collect(),
        };
        resolver.finish(results)
    }

    pub fn resolve_request(&self, request: &ResolutionRequest) -> BatchReport {
        self.resolve_batch(&request.tests, &request.patient)
    }

    /// Resolve a JSON request, returning the JSON report.
    pub fn resolve_request_json(&self, json: &str) -> EngineResult<String> {
        let request: ResolutionRequest = serde_json::from_str(json)?;
        Ok(self.resolve_request(&request).to_json()?)
    }

    /// Find the test a printed name resolves to.
    pub fn lookup_test(&self, name: &str) -> Option<&Test> {
        let resolver = self.resolver();
        let normalized = resolver.normalizer().normalize_name(name);
        resolver
            .identity()
            .resolve(&normalized, name)
            .ok()
            .map(|found| found.test)
    }

    pub fn statistics(&self) -> KbStatistics {
        self.kb.statistics()
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
