//! Intake Orchestrator (§4.17) and externally-visible state machine (§4.9).
//!
//! Coordinates the eight pipeline stages (route, extract, map, audit, write,
//! index) as a dependency graph, mirroring the shape the teacher used for its
//! media-processing task graph: a `Task`/`TaskGraph`/`Orchestrator` triple
//! with dependency-gated scheduling and a poll loop that spawns every
//! currently-ready task. `ExtractDirect` and `OcrFuse` are mutually
//! exclusive and only resolvable once `Route` has run, so the downstream
//! chain is wired into the graph dynamically the moment `Route` completes
//! rather than pre-declared.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use cv_common::model::CandidateProfile;
use cv_common::CorrelationId;
use cv_extract::ExtractedDocument;
use cv_llm::LlmClient;
use cv_ocr::{extract_and_fuse, FusionResult, TextractClient, TextractConfig};
use cv_router::DocumentType;
use cv_storage::search_indexer::PostgresTextSearch;
use cv_storage::vector_storage::QdrantVectorStorage;
use cv_storage::{
    MetadataStorage, PostgresConfig, PostgresMetadataStorage, QdrantConfig, SearchIndexer,
    WriteVerification,
};
use cv_taxonomy::{map_term, AliasIndex, TaxonomyCategory};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] cv_common::PipelineError),

    #[error("ocr error: {0}")]
    Ocr(#[from] cv_ocr::OcrError),

    #[error("structurer error: {0}")]
    Structurer(#[from] cv_structurer::StructurerError),

    #[error("taxonomy error: {0}")]
    Taxonomy(#[from] cv_taxonomy::TaxonomyError),

    #[error("storage error: {0}")]
    Storage(#[from] cv_storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task graph error: {0}")]
    Graph(String),

    #[error("task '{0}' not found in graph")]
    TaskNotFound(String),

    #[error("missing or mistyped dependency result: {0}")]
    MissingDependencyResult(String),

    #[error("status transition rejected: {0}")]
    InvalidTransition(String),
}

type Result<T> = std::result::Result<T, OrchestratorError>;

/// The externally-visible intake status DAG (§4.9): `uploading -> pending ->
/// extracting -> parsing -> mapping -> storing -> indexing -> completed`,
/// with `failed` reachable from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeStatus {
    Uploading,
    Pending,
    Extracting,
    Parsing,
    Mapping,
    Storing,
    Indexing,
    Completed,
    Failed(String),
}

const STATUS_DAG_LEN: usize = 8;

impl IntakeStatus {
    fn ordinal(&self) -> Option<usize> {
        match self {
            Self::Uploading => Some(0),
            Self::Pending => Some(1),
            Self::Extracting => Some(2),
            Self::Parsing => Some(3),
            Self::Mapping => Some(4),
            Self::Storing => Some(5),
            Self::Indexing => Some(6),
            Self::Completed => Some(7),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Derived progress fraction (§4.9): DAG-index divided by DAG length,
    /// 1.0 on successful completion, 0.0 on failure.
    #[must_use]
    pub fn progress(&self) -> f32 {
        match self {
            Self::Completed => 1.0,
            Self::Failed(_) => 0.0,
            other => other.ordinal().map_or(0.0, |i| i as f32 / STATUS_DAG_LEN as f32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeRecord {
    pub correlation_id: CorrelationId,
    pub status: IntakeStatus,
    pub candidate_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Process-local store of intake status, one record per correlation id.
/// Transitions are monotone along the status DAG; a transition to `Failed`
/// is always accepted from any non-terminal state, and same-ordinal
/// transitions (two task types folding into one externally-visible status)
/// are idempotent rather than rejected.
pub struct IntakeStatusStore {
    records: RwLock<HashMap<CorrelationId, IntakeRecord>>,
}

impl IntakeStatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self { records: RwLock::new(HashMap::new()) }
    }

    pub async fn begin(&self, correlation_id: CorrelationId) {
        let mut records = self.records.write().await;
        records.insert(
            correlation_id,
            IntakeRecord {
                correlation_id,
                status: IntakeStatus::Uploading,
                candidate_id: None,
                updated_at: Utc::now(),
            },
        );
    }

    pub async fn transition(&self, correlation_id: CorrelationId, status: IntakeStatus) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&correlation_id) else {
            return Err(OrchestratorError::InvalidTransition(format!(
                "no intake record for {correlation_id}"
            )));
        };

        if record.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition(format!(
                "{correlation_id} is already terminal ({:?})",
                record.status
            )));
        }

        if let (Some(current), Some(next)) = (record.status.ordinal(), status.ordinal()) {
            if next < current {
                return Err(OrchestratorError::InvalidTransition(format!(
                    "{correlation_id} cannot regress from {:?} to {:?}",
                    record.status, status
                )));
            }
        }

        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    pub async fn set_candidate_id(&self, correlation_id: CorrelationId, candidate_id: Uuid) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&correlation_id) {
            record.candidate_id = Some(candidate_id);
        }
    }

    #[must_use]
    pub async fn get(&self, correlation_id: CorrelationId) -> Option<IntakeRecord> {
        self.records.read().await.get(&correlation_id).cloned()
    }
}

impl Default for IntakeStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Task types the orchestrator schedules (§4.17), generalized from the
/// teacher's media-processing `TaskType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Route,
    ExtractDirect,
    OcrFuse,
    Structure,
    MapTaxonomy,
    AuditQuality,
    WriteRelational,
    IndexSearch,
}

impl TaskType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::ExtractDirect => "extract_direct",
            Self::OcrFuse => "ocr_fuse",
            Self::Structure => "structure",
            Self::MapTaxonomy => "map_taxonomy",
            Self::AuditQuality => "audit_quality",
            Self::WriteRelational => "write_relational",
            Self::IndexSearch => "index_search",
        }
    }

    /// The intake status this task type's completion drives (§4.9 <->
    /// §4.17 bridge). `AuditQuality` folds into `Mapping` alongside
    /// `MapTaxonomy`; there is no separate externally-visible state for it.
    #[must_use]
    pub fn intake_status(&self) -> IntakeStatus {
        match self {
            Self::Route => IntakeStatus::Pending,
            Self::ExtractDirect | Self::OcrFuse => IntakeStatus::Extracting,
            Self::Structure => IntakeStatus::Parsing,
            Self::MapTaxonomy | Self::AuditQuality => IntakeStatus::Mapping,
            Self::WriteRelational => IntakeStatus::Storing,
            Self::IndexSearch => IntakeStatus::Indexing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed(String),
}

/// Marker result for the index task; the embedding and text index rows
/// themselves are side effects, not data callers need back.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub candidate_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum TaskResult {
    Route(DocumentType),
    ExtractDirect(ExtractedDocument),
    OcrFuse(FusionResult),
    Structure(CandidateProfile),
    MapTaxonomy(CandidateProfile),
    AuditQuality(CandidateProfile),
    WriteRelational(WriteVerification),
    IndexSearch(IndexStats),
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub dependencies: Vec<String>,
    pub state: TaskState,
    pub result: Option<TaskResult>,
}

impl Task {
    #[must_use]
    pub fn new(id: String, task_type: TaskType, dependencies: Vec<String>) -> Self {
        Self { id, task_type, dependencies, state: TaskState::Pending, result: None }
    }

    #[must_use]
    pub fn is_ready(&self, completed: &HashSet<String>) -> bool {
        self.state == TaskState::Pending && self.dependencies.iter().all(|d| completed.contains(d))
    }
}

/// Task graph for one intake's pipeline run.
#[derive(Clone)]
pub struct TaskGraph {
    pub job_id: CorrelationId,
    pub input_path: PathBuf,
    tasks: HashMap<String, Task>,
    completed: HashSet<String>,
    failed: HashSet<String>,
}

impl TaskGraph {
    #[must_use]
    pub fn new(job_id: CorrelationId, input_path: PathBuf) -> Self {
        Self {
            job_id,
            input_path,
            tasks: HashMap::with_capacity(8),
            completed: HashSet::with_capacity(8),
            failed: HashSet::with_capacity(2),
        }
    }

    pub fn add_task(&mut self, id: String, task_type: TaskType, dependencies: Vec<String>) {
        let task = Task::new(id.clone(), task_type, dependencies);
        self.tasks.insert(id, task);
    }

    #[must_use]
    pub fn get_ready_tasks(&self) -> Vec<String> {
        self.tasks.values().filter(|t| t.is_ready(&self.completed)).map(|t| t.id.clone()).collect()
    }

    pub fn mark_running(&mut self, task_id: &str) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.state = TaskState::Running;
        }
    }

    pub fn mark_completed(&mut self, task_id: &str, result: TaskResult) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.state = TaskState::Completed;
            task.result = Some(result);
            self.completed.insert(task_id.to_string());
        }
    }

    pub fn mark_failed(&mut self, task_id: &str, error: String) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.state = TaskState::Failed(error);
            self.failed.insert(task_id.to_string());
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| matches!(t.state, TaskState::Completed | TaskState::Failed(_)))
    }

    #[must_use]
    pub fn has_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    #[must_use]
    pub fn get_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.tasks.get(task_id).and_then(|t| t.result.as_ref())
    }

    #[must_use]
    pub fn tasks(&self) -> &HashMap<String, Task> {
        &self.tasks
    }

    pub fn validate(&self) -> Result<()> {
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                if !self.tasks.contains_key(dep) {
                    return Err(OrchestratorError::Graph(format!(
                        "task '{}' has missing dependency '{}'",
                        task.id, dep
                    )));
                }
            }
        }

        let mut visited = HashSet::with_capacity(self.tasks.len());
        let mut stack = HashSet::with_capacity(self.tasks.len());
        for id in self.tasks.keys().map(String::as_str) {
            if self.has_cycle(id, &mut visited, &mut stack) {
                return Err(OrchestratorError::Graph("task graph contains a cycle".into()));
            }
        }
        Ok(())
    }

    fn has_cycle<'a>(&'a self, id: &'a str, visited: &mut HashSet<&'a str>, stack: &mut HashSet<&'a str>) -> bool {
        if stack.contains(id) {
            return true;
        }
        if visited.contains(id) {
            return false;
        }
        visited.insert(id);
        stack.insert(id);
        if let Some(task) = self.tasks.get(id) {
            for dep in &task.dependencies {
                if self.has_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }
        stack.remove(id);
        false
    }
}

#[derive(Debug, Clone)]
pub struct TaskGraphStatus {
    pub job_id: CorrelationId,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub is_complete: bool,
    pub has_failed: bool,
}

/// Coordinates one intake pipeline run end to end (§4.17). `llm` and
/// `alias_index` are long-lived, shared across every task this orchestrator
/// runs; storage clients are opened fresh per write, matching the teacher's
/// `crates/storage` connection pattern (`metadata_storage.rs`).
#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    alias_index: Arc<AliasIndex>,
    statuses: Arc<IntakeStatusStore>,
    graphs: Arc<RwLock<HashMap<CorrelationId, Arc<Mutex<TaskGraph>>>>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, alias_index: Arc<AliasIndex>) -> Self {
        Self {
            llm,
            alias_index,
            statuses: Arc::new(IntakeStatusStore::new()),
            graphs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn statuses(&self) -> Arc<IntakeStatusStore> {
        self.statuses.clone()
    }

    /// Build the initial graph for a fresh intake: just `route`. The rest
    /// of the chain is wired in once `route` resolves the document type.
    #[must_use]
    pub fn build_intake_graph(&self, correlation_id: CorrelationId, input_path: PathBuf) -> TaskGraph {
        let mut graph = TaskGraph::new(correlation_id, input_path);
        graph.add_task("route".to_string(), TaskType::Route, vec![]);
        graph
    }

    pub async fn status(&self, correlation_id: CorrelationId) -> Option<IntakeRecord> {
        self.statuses.get(correlation_id).await
    }

    /// Run a graph to completion, spawning every ready task each round
    /// (§5 concurrency model: independent tasks run concurrently, a single
    /// intake's failure doesn't affect any other intake's graph).
    pub async fn execute(&self, graph: TaskGraph) -> Result<TaskGraph> {
        let correlation_id = graph.job_id;
        graph.validate()?;
        self.statuses.transition(correlation_id, IntakeStatus::Pending).await?;

        let graph = Arc::new(Mutex::new(graph));
        {
            let mut graphs = self.graphs.write().await;
            graphs.insert(correlation_id, graph.clone());
        }

        let mut extract_chain_added = false;
        loop {
            let ready = {
                let g = graph.lock().await;
                if g.is_complete() {
                    if g.has_failed() {
                        warn!(%correlation_id, failed = g.failed.len(), "intake completed with failed tasks");
                    } else {
                        info!(%correlation_id, "intake completed successfully");
                    }
                    break;
                }
                g.get_ready_tasks()
            };

            if ready.is_empty() {
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                continue;
            }

            let mut handles = Vec::with_capacity(ready.len());
            for task_id in ready {
                let orchestrator = self.clone();
                let graph_clone = graph.clone();
                handles.push(tokio::spawn(async move {
                    orchestrator.run_task(graph_clone, task_id, correlation_id).await;
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }

            if !extract_chain_added {
                let route_result = {
                    let g = graph.lock().await;
                    g.get_result("route").cloned()
                };
                if let Some(TaskResult::Route(doc_type)) = route_result {
                    let mut g = graph.lock().await;
                    let extract_type = if doc_type.needs_ocr() { TaskType::OcrFuse } else { TaskType::ExtractDirect };
                    g.add_task("extract".to_string(), extract_type, vec!["route".to_string()]);
                    g.add_task("structure".to_string(), TaskType::Structure, vec!["extract".to_string()]);
                    g.add_task("map_taxonomy".to_string(), TaskType::MapTaxonomy, vec!["structure".to_string()]);
                    g.add_task("audit_quality".to_string(), TaskType::AuditQuality, vec!["map_taxonomy".to_string()]);
                    g.add_task("write_relational".to_string(), TaskType::WriteRelational, vec!["audit_quality".to_string()]);
                    g.add_task("index_search".to_string(), TaskType::IndexSearch, vec!["write_relational".to_string()]);
                    g.validate()?;
                    extract_chain_added = true;
                }
            }
        }

        let final_graph = graph.lock().await.clone();
        Ok(final_graph)
    }

    async fn run_task(&self, graph: Arc<Mutex<TaskGraph>>, task_id: String, correlation_id: CorrelationId) {
        let (task_type, input_path) = {
            let mut g = graph.lock().await;
            g.mark_running(&task_id);
            match g.tasks.get(&task_id) {
                Some(task) => (task.task_type, g.input_path.clone()),
                None => {
                    error!(%task_id, "task not found in graph");
                    g.mark_failed(&task_id, "task not found in graph".to_string());
                    return;
                }
            }
        };

        info!(%task_id, task = task_type.name(), "executing task");
        let result = self.execute_task_type(task_type, &input_path, &graph).await;

        let mut g = graph.lock().await;
        match result {
            Ok(task_result) => {
                if let TaskResult::WriteRelational(ref verification) = task_result {
                    self.statuses.set_candidate_id(correlation_id, verification.candidate_id).await;
                }
                g.mark_completed(&task_id, task_result);
                if let Err(e) = self.statuses.transition(correlation_id, task_type.intake_status()).await {
                    warn!(%correlation_id, error = %e, "status transition rejected");
                }
                if matches!(task_type, TaskType::IndexSearch) {
                    let _ = self.statuses.transition(correlation_id, IntakeStatus::Completed).await;
                }
            }
            Err(e) => {
                error!(%task_id, error = %e, "task failed");
                let message = e.to_string();
                g.mark_failed(&task_id, message.clone());
                let _ = self.statuses.transition(correlation_id, IntakeStatus::Failed(message)).await;
            }
        }
    }

    async fn execute_task_type(
        &self,
        task_type: TaskType,
        input_path: &Path,
        graph: &Arc<Mutex<TaskGraph>>,
    ) -> Result<TaskResult> {
        match task_type {
            TaskType::Route => {
                let doc_type = cv_router::classify(input_path)?;
                Ok(TaskResult::Route(doc_type))
            }

            TaskType::ExtractDirect => {
                let doc_type = self.result_of(graph, "route", |r| match r {
                    TaskResult::Route(d) => Some(*d),
                    _ => None,
                }).await?;
                let doc = match doc_type {
                    DocumentType::Docx => cv_extract::extract_docx(input_path)?,
                    DocumentType::PdfText => cv_extract::extract_pdf_text(input_path)?,
                    other => {
                        return Err(OrchestratorError::Graph(format!(
                            "extract_direct dispatched for {other:?}, which needs OCR"
                        )))
                    }
                };
                Ok(TaskResult::ExtractDirect(doc))
            }

            TaskType::OcrFuse => {
                let image_bytes = tokio::fs::read(input_path).await?;
                let image_base64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);
                let cloud = TextractClient::new(TextractConfig::default());
                let fusion =
                    extract_and_fuse(&image_bytes, &image_base64, "ell+eng", self.llm.as_ref(), &cloud).await?;
                Ok(TaskResult::OcrFuse(fusion))
            }

            TaskType::Structure => {
                let raw_text = {
                    let g = graph.lock().await;
                    match g.get_result("extract") {
                        Some(TaskResult::ExtractDirect(doc)) => doc.text.clone(),
                        Some(TaskResult::OcrFuse(fusion)) => fusion.text.clone(),
                        _ => return Err(OrchestratorError::MissingDependencyResult("extract".into())),
                    }
                };
                let profile = cv_structurer::structure(&raw_text, self.llm.as_ref()).await?;
                Ok(TaskResult::Structure(profile))
            }

            TaskType::MapTaxonomy => {
                let mut profile = self.profile_result(graph, "structure").await?;
                self.map_taxonomy_fields(&mut profile).await?;
                Ok(TaskResult::MapTaxonomy(profile))
            }

            TaskType::AuditQuality => {
                let mut profile = self.profile_result(graph, "map_taxonomy").await?;
                cv_quality::audit(&mut profile);
                Ok(TaskResult::AuditQuality(profile))
            }

            TaskType::WriteRelational => {
                let profile = self.profile_result(graph, "audit_quality").await?;
                let storage = PostgresMetadataStorage::new(PostgresConfig::default());
                let verification = storage.write_candidate(&profile).await?;
                Ok(TaskResult::WriteRelational(verification))
            }

            TaskType::IndexSearch => {
                let mut profile = self.profile_result(graph, "audit_quality").await?;
                let candidate_id = self.result_of(graph, "write_relational", |r| match r {
                    TaskResult::WriteRelational(v) => Some(v.candidate_id),
                    _ => None,
                }).await?;
                profile.id = candidate_id;

                let vectors = QdrantVectorStorage::new(QdrantConfig::default()).await?;
                let postgres_config = PostgresConfig::default();
                let text = PostgresTextSearch::new(&postgres_config.connection_string()).await?;
                let indexer = SearchIndexer::new(vectors, text);
                indexer.index_candidate(&profile, self.llm.as_ref()).await?;
                Ok(TaskResult::IndexSearch(IndexStats { candidate_id }))
            }
        }
    }

    async fn result_of<T>(
        &self,
        graph: &Arc<Mutex<TaskGraph>>,
        task_id: &str,
        extract: impl Fn(&TaskResult) -> Option<T>,
    ) -> Result<T> {
        let g = graph.lock().await;
        g.get_result(task_id)
            .and_then(extract)
            .ok_or_else(|| OrchestratorError::MissingDependencyResult(task_id.to_string()))
    }

    async fn profile_result(&self, graph: &Arc<Mutex<TaskGraph>>, task_id: &str) -> Result<CandidateProfile> {
        let g = graph.lock().await;
        match g.get_result(task_id) {
            Some(TaskResult::Structure(p) | TaskResult::MapTaxonomy(p) | TaskResult::AuditQuality(p)) => {
                Ok(p.clone())
            }
            _ => Err(OrchestratorError::MissingDependencyResult(task_id.to_string())),
        }
    }

    async fn map_taxonomy_fields(&self, profile: &mut CandidateProfile) -> Result<()> {
        for skill in &mut profile.skills {
            skill.taxonomy =
                map_term(&self.alias_index, self.llm.as_ref(), TaxonomyCategory::Skill, &skill.name).await?;
        }
        for software in &mut profile.software {
            software.taxonomy =
                map_term(&self.alias_index, self.llm.as_ref(), TaxonomyCategory::Software, &software.name).await?;
        }
        for cert in &mut profile.certifications {
            cert.taxonomy =
                map_term(&self.alias_index, self.llm.as_ref(), TaxonomyCategory::Certification, &cert.name).await?;
        }
        for exp in &mut profile.experience {
            exp.role_taxonomy =
                map_term(&self.alias_index, self.llm.as_ref(), TaxonomyCategory::Role, &exp.title).await?;
        }
        Ok(())
    }

    #[must_use]
    pub async fn graph_status(&self, correlation_id: CorrelationId) -> Option<TaskGraphStatus> {
        let graphs = self.graphs.read().await;
        let graph = graphs.get(&correlation_id)?.lock().await;
        Some(TaskGraphStatus {
            job_id: graph.job_id,
            total_tasks: graph.tasks.len(),
            completed_tasks: graph.completed.len(),
            failed_tasks: graph.failed.len(),
            is_complete: graph.is_complete(),
            has_failed: graph.has_failed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> TaskGraph {
        let mut graph = TaskGraph::new(CorrelationId::new(), PathBuf::from("cv.pdf"));
        graph.add_task("route".into(), TaskType::Route, vec![]);
        graph.add_task("extract".into(), TaskType::ExtractDirect, vec!["route".into()]);
        graph.add_task("structure".into(), TaskType::Structure, vec!["extract".into()]);
        graph
    }

    #[test]
    fn ready_tasks_respect_dependencies() {
        let graph = sample_graph();
        assert_eq!(graph.get_ready_tasks(), vec!["route".to_string()]);
    }

    #[test]
    fn mark_completed_unblocks_dependents() {
        let mut graph = sample_graph();
        graph.mark_completed("route", TaskResult::Route(DocumentType::PdfText));
        assert_eq!(graph.get_ready_tasks(), vec!["extract".to_string()]);
    }

    #[test]
    fn missing_dependency_fails_validation() {
        let mut graph = TaskGraph::new(CorrelationId::new(), PathBuf::from("cv.pdf"));
        graph.add_task("structure".into(), TaskType::Structure, vec!["extract".into()]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn cycle_fails_validation() {
        let mut graph = TaskGraph::new(CorrelationId::new(), PathBuf::from("cv.pdf"));
        graph.add_task("a".into(), TaskType::Route, vec!["b".into()]);
        graph.add_task("b".into(), TaskType::Structure, vec!["a".into()]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn task_type_status_mapping_matches_spec() {
        assert_eq!(TaskType::Route.intake_status(), IntakeStatus::Pending);
        assert_eq!(TaskType::OcrFuse.intake_status(), IntakeStatus::Extracting);
        assert_eq!(TaskType::MapTaxonomy.intake_status(), IntakeStatus::Mapping);
        assert_eq!(TaskType::AuditQuality.intake_status(), IntakeStatus::Mapping);
        assert_eq!(TaskType::IndexSearch.intake_status(), IntakeStatus::Indexing);
    }

    #[test]
    fn progress_is_zero_uploading_and_one_completed() {
        assert_eq!(IntakeStatus::Uploading.progress(), 0.0);
        assert_eq!(IntakeStatus::Completed.progress(), 1.0);
        assert_eq!(IntakeStatus::Failed("x".into()).progress(), 0.0);
    }

    #[tokio::test]
    async fn status_store_rejects_regression() {
        let store = IntakeStatusStore::new();
        let id = CorrelationId::new();
        store.begin(id).await;
        store.transition(id, IntakeStatus::Extracting).await.unwrap();
        assert!(store.transition(id, IntakeStatus::Pending).await.is_err());
    }

    #[tokio::test]
    async fn status_store_allows_same_ordinal_repeat() {
        let store = IntakeStatusStore::new();
        let id = CorrelationId::new();
        store.begin(id).await;
        store.transition(id, IntakeStatus::Pending).await.unwrap();
        store.transition(id, IntakeStatus::Mapping).await.unwrap();
        store.transition(id, IntakeStatus::Mapping).await.unwrap();
    }

    #[tokio::test]
    async fn status_store_allows_failure_from_any_non_terminal_state() {
        let store = IntakeStatusStore::new();
        let id = CorrelationId::new();
        store.begin(id).await;
        store.transition(id, IntakeStatus::Extracting).await.unwrap();
        store.transition(id, IntakeStatus::Failed("boom".into())).await.unwrap();
        assert!(store.transition(id, IntakeStatus::Completed).await.is_err());
    }
}
