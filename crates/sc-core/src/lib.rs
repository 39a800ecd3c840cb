//! Contract Processing Pipeline Core
//!
//! This crate provides the core pipeline for smart-contract analysis,
//! rewriting and generation: compile the source best-effort, ask the
//! external reasoning service, normalize its untrusted response into a
//! typed report, recompute gas deltas from primary values, and persist a
//! tagged history record.

pub mod gas;
pub mod model;
pub mod normalize;
pub mod store;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use model::{
    AnalysisReport, AnalyzeRequest, CompilationResult, ContractDetail, ContractOutput,
    ContractRecord, FieldError, GasFunctionAnalysis, GasProvenance, GenerateRequest,
    GenerationOutput, HistoryItem, RewriteReport, RewriteRequest, Severity, Vulnerability,
};
pub use normalize::Normalized;
pub use store::{ContractStore, MemoryStore, StoreCounts};

/// Failures of the external reasoning service
#[derive(Error, Debug)]
pub enum AiServiceError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("server error (status {status:?}): {message}")]
    Server { status: Option<u16>, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl AiServiceError {
    /// Transient failures warrant exactly one retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AiServiceError::Timeout(_)
                | AiServiceError::RateLimited(_)
                | AiServiceError::Server { .. }
        )
    }
}

/// Failures at the persistence boundary. Always surfaced loudly; the
/// pipeline never reports a record as saved when it was not.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("detail payload failed plain-structure conversion: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    #[error("compilation error: {0}")]
    Compilation(String),

    #[error(transparent)]
    AiService(#[from] AiServiceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Adapter around the external compiler toolchain. Best-effort by
/// contract: implementations return a degraded `CompilationResult` instead
/// of failing, so the pipeline never aborts on bad source.
#[async_trait]
pub trait CompilerBackend: Send + Sync {
    async fn compile(&self, source: &str, requested_version: Option<&str>) -> CompilationResult;
}

/// Client for the external reasoning service. Each method builds the
/// operation-specific prompt and returns the raw response text, which is
/// untrusted until the normalizer has seen it.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<String, AiServiceError>;
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, AiServiceError>;
    async fn generate(&self, request: &GenerateRequest) -> Result<String, AiServiceError>;
}

/// Pipeline stages, in order. `Failed` is terminal only before the
/// reasoning call; afterwards the run always produces some report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Compiling,
    AiCalling,
    Normalizing,
    Persisted,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Received => "received",
            PipelineStage::Compiling => "compiling",
            PipelineStage::AiCalling => "ai-calling",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One sequential pipeline instance per request. Collaborators are
/// injected so tests can substitute fakes.
pub struct ContractPipeline {
    compiler: Arc<dyn CompilerBackend>,
    ai: Arc<dyn ReasoningClient>,
    store: Arc<dyn ContractStore>,
}

impl ContractPipeline {
    pub fn new(
        compiler: Arc<dyn CompilerBackend>,
        ai: Arc<dyn ReasoningClient>,
        store: Arc<dyn ContractStore>,
    ) -> Self {
        Self {
            compiler,
            ai,
            store,
        }
    }

    /// Analyze a contract for vulnerabilities, quality and gas usage.
    pub async fn analyze(&self, request: AnalyzeRequest) -> CoreResult<ContractOutput> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        info!(%request_id, stage = %PipelineStage::Received, "analyze request");

        let errors = request.validate();
        if !errors.is_empty() {
            warn!(%request_id, stage = %PipelineStage::Failed, "request rejected");
            return Err(CoreError::Validation(errors));
        }

        info!(%request_id, stage = %PipelineStage::Compiling);
        let compilation = self
            .compiler
            .compile(&request.source_code, request.compiler_version.as_deref())
            .await;

        info!(%request_id, stage = %PipelineStage::AiCalling);
        let raw = match self.ai.analyze(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%request_id, error = %e, "reasoning service failed, degrading");
                None
            }
        };

        info!(%request_id, stage = %PipelineStage::Normalizing);
        let normalized = match raw.as_deref() {
            Some(text) => normalize::normalize_analysis(text),
            None => Normalized {
                report: AnalysisReport::default(),
                degraded: true,
            },
        };
        let mut report = normalized.report;
        gas::finalize_analysis(&mut report, compilation.gas_estimates.clone());
        report
            .general_suggestions
            .extend(compilation.warnings.iter().cloned());

        let success = !normalized.degraded;
        let record = ContractRecord {
            id: request_id,
            contract_name: named(&request.contract_name),
            original_code: request.source_code.clone(),
            created_at: Utc::now(),
            success,
            detail: ContractDetail::Analysis(report.clone()),
        };
        let persisted = self.persist(&record).await;

        Ok(ContractOutput {
            request_id,
            original_code: request.source_code,
            rewritten_code: None,
            generated_code: None,
            analysis_report: Some(report),
            rewrite_report: None,
            generation_notes: None,
            success,
            compilation_success: Some(compilation.success),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            message: build_message("Analysis", success, Some(compilation.success), persisted),
        })
    }

    /// Rewrite a contract for lower gas usage.
    pub async fn rewrite(&self, request: RewriteRequest) -> CoreResult<ContractOutput> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        info!(%request_id, stage = %PipelineStage::Received, "rewrite request");

        let errors = request.validate();
        if !errors.is_empty() {
            warn!(%request_id, stage = %PipelineStage::Failed, "request rejected");
            return Err(CoreError::Validation(errors));
        }

        info!(%request_id, stage = %PipelineStage::Compiling);
        let compilation = self
            .compiler
            .compile(&request.source_code, request.compiler_version.as_deref())
            .await;

        info!(%request_id, stage = %PipelineStage::AiCalling);
        let raw = match self.ai.rewrite(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%request_id, error = %e, "reasoning service failed, degrading");
                None
            }
        };

        info!(%request_id, stage = %PipelineStage::Normalizing);
        let normalized = match raw.as_deref() {
            Some(text) => normalize::normalize_rewrite(text),
            None => Normalized {
                report: RewriteReport::default(),
                degraded: true,
            },
        };
        let mut report = normalized.report;
        gas::finalize_rewrite(&mut report);

        let success = !normalized.degraded;
        let record = ContractRecord {
            id: request_id,
            contract_name: named(&request.contract_name),
            original_code: request.source_code.clone(),
            created_at: Utc::now(),
            success,
            detail: ContractDetail::Rewrite(report.clone()),
        };
        let persisted = self.persist(&record).await;

        let rewritten_code = (!report.rewritten_code.is_empty()).then(|| report.rewritten_code.clone());
        Ok(ContractOutput {
            request_id,
            original_code: request.source_code,
            rewritten_code,
            generated_code: None,
            analysis_report: None,
            rewrite_report: Some(report),
            generation_notes: None,
            success,
            compilation_success: Some(compilation.success),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            message: build_message("Rewrite", success, Some(compilation.success), persisted),
        })
    }

    /// Generate a contract from a natural-language description.
    pub async fn generate(&self, request: GenerateRequest) -> CoreResult<ContractOutput> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        info!(%request_id, stage = %PipelineStage::Received, "generate request");

        let errors = request.validate();
        if !errors.is_empty() {
            warn!(%request_id, stage = %PipelineStage::Failed, "request rejected");
            return Err(CoreError::Validation(errors));
        }

        info!(%request_id, stage = %PipelineStage::AiCalling);
        let raw = match self.ai.generate(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%request_id, error = %e, "reasoning service failed, degrading");
                None
            }
        };

        info!(%request_id, stage = %PipelineStage::Normalizing);
        let normalized = match raw.as_deref() {
            Some(text) => normalize::normalize_generation(text),
            None => Normalized {
                report: GenerationOutput::default(),
                degraded: true,
            },
        };
        let report = normalized.report;
        let success = !normalized.degraded;

        // Best-effort sanity compile of the generated code.
        let compilation_success = if success {
            info!(%request_id, stage = %PipelineStage::Compiling, "compiling generated code");
            let compilation = self
                .compiler
                .compile(&report.generated_code, request.compiler_version.as_deref())
                .await;
            Some(compilation.success)
        } else {
            None
        };

        let record = ContractRecord {
            id: request_id,
            contract_name: request.contract_name.clone(),
            original_code: String::new(),
            created_at: Utc::now(),
            success,
            detail: ContractDetail::Generation(report.clone()),
        };
        let persisted = self.persist(&record).await;

        let generated_code = success.then(|| report.generated_code.clone());
        Ok(ContractOutput {
            request_id,
            original_code: String::new(),
            rewritten_code: None,
            generated_code,
            analysis_report: None,
            rewrite_report: None,
            generation_notes: Some(report.generation_notes.clone()),
            success,
            compilation_success,
            processing_time_seconds: started.elapsed().as_secs_f64(),
            message: build_message("Generation", success, compilation_success, persisted),
        })
    }

    /// Single-record append. A failure here is logged loudly and reported
    /// in the response message; the computed result is still returned.
    async fn persist(&self, record: &ContractRecord) -> bool {
        match self.store.insert(record).await {
            Ok(()) => {
                info!(record_id = %record.id, stage = %PipelineStage::Persisted);
                true
            }
            Err(e) => {
                error!(record_id = %record.id, error = %e, "failed to persist history record");
                false
            }
        }
    }
}

fn named(contract_name: &Option<String>) -> String {
    contract_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unnamed")
        .to_string()
}

fn build_message(
    operation: &str,
    success: bool,
    compilation_success: Option<bool>,
    persisted: bool,
) -> String {
    let mut message = if success {
        format!("{} completed successfully", operation)
    } else {
        format!(
            "{} degraded: the reasoning service did not return a usable report",
            operation
        )
    };
    if compilation_success == Some(false) {
        message.push_str("; compilation failed, compiler-derived gas figures unavailable");
    }
    if !persisted {
        message.push_str("; result computed but history record was not saved");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GasDelta;

    struct FakeCompiler {
        result: CompilationResult,
    }

    #[async_trait]
    impl CompilerBackend for FakeCompiler {
        async fn compile(&self, _source: &str, _version: Option<&str>) -> CompilationResult {
            self.result.clone()
        }
    }

    struct FakeAi {
        response: Result<String, ()>,
    }

    impl FakeAi {
        fn responding(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
            }
        }

        fn failing() -> Self {
            Self { response: Err(()) }
        }

        fn reply(&self) -> Result<String, AiServiceError> {
            self.response
                .clone()
                .map_err(|_| AiServiceError::Timeout(45))
        }
    }

    #[async_trait]
    impl ReasoningClient for FakeAi {
        async fn analyze(&self, _request: &AnalyzeRequest) -> Result<String, AiServiceError> {
            self.reply()
        }
        async fn rewrite(&self, _request: &RewriteRequest) -> Result<String, AiServiceError> {
            self.reply()
        }
        async fn generate(&self, _request: &GenerateRequest) -> Result<String, AiServiceError> {
            self.reply()
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ContractStore for FailingStore {
        async fn insert(&self, _record: &ContractRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::Storage("disk on fire".to_string()))
        }
        async fn list(&self, _skip: i64, _limit: i64) -> Result<Vec<ContractRecord>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn delete(&self, _id: Uuid) -> Result<bool, PersistenceError> {
            Ok(false)
        }
        async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
            Ok(StoreCounts::default())
        }
    }

    fn pipeline(compiler: FakeCompiler, ai: FakeAi) -> (ContractPipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = ContractPipeline::new(Arc::new(compiler), Arc::new(ai), store.clone());
        (pipeline, store)
    }

    fn good_compiler() -> FakeCompiler {
        FakeCompiler {
            result: CompilationResult {
                success: true,
                ..Default::default()
            },
        }
    }

    const REENTRANCY_RESPONSE: &str = r#"Here is the report:
```json
{
  "vulnerabilities": [
    {
      "type": "reentrancy",
      "severity": "critical",
      "line": 14,
      "description": "External call precedes the balance update",
      "recommendation": "Apply checks-effects-interactions or a reentrancy guard"
    }
  ],
  "gas_analysis": [
    {"function": "withdraw()", "original_gas": 48000, "optimized_gas": 43000}
  ],
  "security_score": 35,
  "general_suggestions": ["Add a reentrancy guard"]
}
```"#;

    #[tokio::test]
    async fn unguarded_external_call_is_reported_as_reentrancy() {
        let (pipeline, _) = pipeline(good_compiler(), FakeAi::responding(REENTRANCY_RESPONSE));
        let out = pipeline
            .analyze(AnalyzeRequest {
                source_code:
                    "contract Vault { function withdraw() public { msg.sender.call{value: bal}(\"\"); bal = 0; } }"
                        .to_string(),
                contract_name: Some("Vault".to_string()),
                compiler_version: None,
            })
            .await
            .unwrap();

        assert!(out.success);
        let report = out.analysis_report.unwrap();
        let hit = report
            .vulnerabilities
            .iter()
            .find(|v| v.vulnerability_type.contains("reentrancy"))
            .expect("reentrancy finding");
        assert!(hit.severity >= Severity::High);
        // Savings recomputed, not taken from the model.
        let gas = &report.gas_analysis[0];
        assert_eq!(gas.savings, Some(5000));
        assert!((gas.savings_percent.unwrap() - 10.416666666666668).abs() < 1e-9);
    }

    #[tokio::test]
    async fn malformed_response_completes_with_degraded_report() {
        let (pipeline, store) = pipeline(good_compiler(), FakeAi::responding("504 gateway noise"));
        let out = pipeline
            .analyze(AnalyzeRequest {
                source_code: "contract A {}".to_string(),
                contract_name: None,
                compiler_version: None,
            })
            .await
            .unwrap();

        assert!(!out.success);
        assert!(out.message.contains("degraded"));
        let report = out.analysis_report.unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.general_suggestions, vec!["504 gateway noise".to_string()]);

        // The degraded run is still recorded, honestly marked unsuccessful.
        let records = store.list(0, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn invalid_source_yields_degraded_compilation_not_a_crash() {
        let compiler = FakeCompiler {
            result: CompilationResult {
                success: false,
                errors: vec!["ParserError: expected ';'".to_string()],
                ..Default::default()
            },
        };
        let (pipeline, _) = pipeline(compiler, FakeAi::responding(r#"{"vulnerabilities": []}"#));
        let out = pipeline
            .analyze(AnalyzeRequest {
                source_code: "contract {".to_string(),
                contract_name: None,
                compiler_version: None,
            })
            .await
            .unwrap();

        assert_eq!(out.compilation_success, Some(false));
        let report = out.analysis_report.unwrap();
        assert!(report.gas_analysis.is_empty());
        assert!(report.original_gas.is_none());
    }

    #[tokio::test]
    async fn empty_source_is_rejected_before_any_call() {
        let (pipeline, store) = pipeline(good_compiler(), FakeAi::failing());
        let err = pipeline
            .analyze(AnalyzeRequest {
                source_code: "   ".to_string(),
                contract_name: None,
                compiler_version: None,
            })
            .await
            .unwrap_err();

        match err {
            CoreError::Validation(fields) => {
                assert_eq!(fields[0].field, "source_code");
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert!(store.list(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewrite_preserves_original_code_byte_for_byte() {
        let source = "contract  Weird{\tuint x;\r\n}";
        let response = r#"{"rewritten_code": "contract Weird { uint256 x; }", "gas_optimization_details": {"original": 300, "optimized": 240}, "suggestions": ["pack storage"]}"#;
        let (pipeline, _) = pipeline(good_compiler(), FakeAi::responding(response));
        let out = pipeline
            .rewrite(RewriteRequest {
                source_code: source.to_string(),
                contract_name: None,
                compiler_version: None,
                optimization_goals: vec!["gas".to_string()],
                preserve_functionality: true,
            })
            .await
            .unwrap();

        assert_eq!(out.original_code, source);
        assert!(out.success);
        let report = out.rewrite_report.unwrap();
        assert_eq!(
            report.gas,
            GasDelta {
                original_gas: Some(300),
                optimized_gas: Some(240),
                savings: Some(60),
                savings_percent: Some(20.0),
            }
        );
    }

    #[tokio::test]
    async fn generate_returns_code_and_success_together() {
        let response = r#"{"generated_code": "contract Token {}", "features": ["mint"], "confidence_score": 0.9}"#;
        let (pipeline, _) = pipeline(good_compiler(), FakeAi::responding(response));
        let out = pipeline
            .generate(GenerateRequest {
                description: "a minimal token".to_string(),
                contract_name: "Token".to_string(),
                features: vec!["mint".to_string()],
                compiler_version: None,
            })
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.generated_code.as_deref(), Some("contract Token {}"));

        let (pipeline, _) = self::pipeline(good_compiler(), FakeAi::failing());
        let out = pipeline
            .generate(GenerateRequest {
                description: "a minimal token".to_string(),
                contract_name: "Token".to_string(),
                features: Vec::new(),
                compiler_version: None,
            })
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.generated_code.is_none());
        assert!(out.message.contains("degraded"));
    }

    #[tokio::test]
    async fn persistence_failure_is_honest_not_silent() {
        let pipeline = ContractPipeline::new(
            Arc::new(good_compiler()),
            Arc::new(FakeAi::responding(r#"{"vulnerabilities": []}"#)),
            Arc::new(FailingStore),
        );
        let out = pipeline
            .analyze(AnalyzeRequest {
                source_code: "contract A {}".to_string(),
                contract_name: None,
                compiler_version: None,
            })
            .await
            .unwrap();

        assert!(out.success);
        assert!(out.message.contains("history record was not saved"));
    }
}
