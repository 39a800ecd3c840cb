//! Domain models for the contract processing pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Maximum accepted contract source size (bytes)
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Severity levels for vulnerabilities, ordered low to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a severity from free-form model output. Unrecognized strings
    /// normalize to `Medium` rather than failing the report.
    pub fn parse_lenient(s: &str) -> Severity {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "info" | "informational" | "note" => Severity::Low,
            "medium" | "moderate" | "warning" => Severity::Medium,
            "high" | "major" => Severity::High,
            "critical" | "severe" | "fatal" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Severity::parse_lenient(&s))
    }
}

/// A single vulnerability reported for a contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(rename = "type")]
    pub vulnerability_type: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: String,
}

/// Origin of a gas figure. Compiler-derived numbers outrank model estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasProvenance {
    #[serde(rename = "compiler")]
    Compiler,
    #[serde(rename = "ai-estimate")]
    AiEstimate,
}

/// Gas figures for one function. Savings fields are always recomputed from
/// the original/optimized values, never taken from the model's arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasFunctionAnalysis {
    pub function_name: String,
    #[serde(default)]
    pub original_gas: Option<u64>,
    #[serde(default)]
    pub optimized_gas: Option<u64>,
    #[serde(default)]
    pub savings: Option<i64>,
    #[serde(default)]
    pub savings_percent: Option<f64>,
    pub provenance: GasProvenance,
}

impl GasFunctionAnalysis {
    pub fn ai_estimate(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            original_gas: None,
            optimized_gas: None,
            savings: None,
            savings_percent: None,
            provenance: GasProvenance::AiEstimate,
        }
    }

    pub fn compiler(function_name: impl Into<String>, original_gas: u64) -> Self {
        Self {
            function_name: function_name.into(),
            original_gas: Some(original_gas),
            optimized_gas: None,
            savings: None,
            savings_percent: None,
            provenance: GasProvenance::Compiler,
        }
    }
}

/// Result of a best-effort compile. Folded into reports, never persisted on
/// its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    #[serde(default)]
    pub abi: Option<serde_json::Value>,
    #[serde(default)]
    pub bytecode: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub gas_estimates: Vec<GasFunctionAnalysis>,
}

impl CompilationResult {
    /// A degraded result carrying one warning, used when the toolchain is
    /// unavailable or times out.
    pub fn degraded(warning: impl Into<String>) -> Self {
        Self {
            success: false,
            warnings: vec![warning.into()],
            ..Default::default()
        }
    }
}

/// Security/quality analysis report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub gas_analysis: Vec<GasFunctionAnalysis>,
    #[serde(default)]
    pub security_score: Option<u8>,
    #[serde(default)]
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub general_suggestions: Vec<String>,
    #[serde(default)]
    pub original_gas: Option<u64>,
    #[serde(default)]
    pub optimized_gas: Option<u64>,
    #[serde(default)]
    pub savings: Option<i64>,
    #[serde(default)]
    pub savings_percent: Option<f64>,
}

/// Aggregate gas figures for a rewrite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GasDelta {
    #[serde(default)]
    pub original_gas: Option<u64>,
    #[serde(default)]
    pub optimized_gas: Option<u64>,
    #[serde(default)]
    pub savings: Option<i64>,
    #[serde(default)]
    pub savings_percent: Option<f64>,
}

/// Optimized-rewrite report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteReport {
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub gas: GasDelta,
    #[serde(default)]
    pub security_improvements: Vec<String>,
    #[serde(default)]
    pub rewritten_code: String,
}

/// Output of contract generation from a natural-language description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOutput {
    #[serde(default)]
    pub generated_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub generation_notes: Vec<String>,
}

/// Per-operation detail payload. The tag is part of the serialized form, so
/// a record can never carry two payloads or a payload that contradicts its
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContractDetail {
    Analysis(AnalysisReport),
    Rewrite(RewriteReport),
    Generation(GenerationOutput),
}

impl ContractDetail {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ContractDetail::Analysis(_) => "analysis",
            ContractDetail::Rewrite(_) => "rewrite",
            ContractDetail::Generation(_) => "generation",
        }
    }

    /// Convert the payload into a plain JSON value at the persistence
    /// boundary. Typed structures never reach the datastore directly.
    pub fn to_plain(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Rebuild a payload from a stored plain value. A corrupt or partial
    /// payload falls back to an empty report of the tagged type rather than
    /// failing the read.
    pub fn from_plain(tag: &str, value: serde_json::Value) -> ContractDetail {
        match serde_json::from_value::<ContractDetail>(value) {
            Ok(detail) if detail.type_tag() == tag => detail,
            Ok(detail) => {
                tracing::warn!(stored = tag, payload = detail.type_tag(), "record tag mismatch, trusting payload");
                detail
            }
            Err(e) => {
                tracing::warn!(tag, error = %e, "unreadable detail payload, substituting empty report");
                Self::empty_for_tag(tag)
            }
        }
    }

    pub fn empty_for_tag(tag: &str) -> ContractDetail {
        match tag {
            "rewrite" => ContractDetail::Rewrite(RewriteReport::default()),
            "generation" => ContractDetail::Generation(GenerationOutput::default()),
            _ => ContractDetail::Analysis(AnalysisReport::default()),
        }
    }

    /// UI-facing summary. Missing nested values default to zero/empty.
    pub fn summary(&self) -> DetailSummary {
        match self {
            ContractDetail::Analysis(report) => DetailSummary {
                headline: format!(
                    "{} vulnerabilities, {} functions analyzed",
                    report.vulnerabilities.len(),
                    report.gas_analysis.len()
                ),
                vulnerability_count: report.vulnerabilities.len(),
                suggestion_count: report.general_suggestions.len(),
                gas_savings_percent: report.savings_percent,
            },
            ContractDetail::Rewrite(report) => DetailSummary {
                headline: format!("{} optimization suggestions", report.suggestions.len()),
                vulnerability_count: 0,
                suggestion_count: report.suggestions.len(),
                gas_savings_percent: report.gas.savings_percent,
            },
            ContractDetail::Generation(output) => DetailSummary {
                headline: format!(
                    "{} features, confidence {:.2}",
                    output.features.len(),
                    output.confidence_score
                ),
                vulnerability_count: 0,
                suggestion_count: output.generation_notes.len(),
                gas_savings_percent: None,
            },
        }
    }
}

/// Persisted history record. Append-only; one detail payload per record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: Uuid,
    pub contract_name: String,
    pub original_code: String,
    pub created_at: DateTime<Utc>,
    pub success: bool,
    pub detail: ContractDetail,
}

impl ContractRecord {
    pub fn to_history_item(&self) -> HistoryItem {
        HistoryItem {
            id: self.id,
            record_type: self.detail.type_tag().to_string(),
            contract_name: self.contract_name.clone(),
            created_at: self.created_at,
            success: self.success,
            summary: self.detail.summary(),
        }
    }
}

/// Unified history entry across all three record types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub record_type: String,
    pub contract_name: String,
    pub created_at: DateTime<Utc>,
    pub success: bool,
    pub summary: DetailSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSummary {
    pub headline: String,
    pub vulnerability_count: usize,
    pub suggestion_count: usize,
    #[serde(default)]
    pub gas_savings_percent: Option<f64>,
}

/// Response returned to the caller for all three operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractOutput {
    pub request_id: Uuid,
    pub original_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_report: Option<AnalysisReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_report: Option<RewriteReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_notes: Option<Vec<String>>,
    pub success: bool,
    #[serde(default)]
    pub compilation_success: Option<bool>,
    pub processing_time_seconds: f64,
    pub message: String,
}

/// Request to analyze a contract for security and quality issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub source_code: String,
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub compiler_version: Option<String>,
}

/// Request to rewrite a contract for lower gas usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub source_code: String,
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub compiler_version: Option<String>,
    #[serde(default)]
    pub optimization_goals: Vec<String>,
    #[serde(default = "default_true")]
    pub preserve_functionality: bool,
}

fn default_true() -> bool {
    true
}

/// Request to generate a contract from a description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub description: String,
    pub contract_name: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub compiler_version: Option<String>,
}

/// A single field-level validation problem
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn validate_source(source: &str, errors: &mut Vec<FieldError>) {
    if source.trim().is_empty() {
        errors.push(FieldError::new("source_code", "must not be empty"));
    } else if source.len() > MAX_SOURCE_BYTES {
        errors.push(FieldError::new(
            "source_code",
            format!("exceeds maximum size of {} bytes", MAX_SOURCE_BYTES),
        ));
    }
}

impl AnalyzeRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validate_source(&self.source_code, &mut errors);
        errors
    }
}

impl RewriteRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validate_source(&self.source_code, &mut errors);
        errors
    }
}

impl GenerateRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "must not be empty"));
        }
        if self.contract_name.trim().is_empty() {
            errors.push(FieldError::new("contract_name", "must not be empty"));
        }
        errors
    }
}
