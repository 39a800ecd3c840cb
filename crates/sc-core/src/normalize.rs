//! Response normalizer
//!
//! The reasoning service returns untrusted text: prose, markdown fences,
//! truncated or malformed JSON. This module extracts the first balanced
//! JSON object, rebuilds a typed report from whatever fields survive, and
//! synthesizes a degraded report when nothing usable is found. Callers
//! always receive a well-typed result.

use crate::model::{
    AnalysisReport, GasFunctionAnalysis, GasProvenance, GenerationOutput, RewriteReport, Severity,
    Vulnerability,
};
use serde_json::Value;

/// A normalized report plus a flag telling whether it was synthesized from
/// an unusable response.
#[derive(Debug, Clone)]
pub struct Normalized<R> {
    pub report: R,
    pub degraded: bool,
}

/// Extract the first balanced top-level JSON object from free-form text.
///
/// Prefers a ```json fenced block when present, then falls back to scanning
/// for a balanced `{...}` span. The scan is aware of JSON strings and
/// escapes, so braces inside string values do not confuse it.
pub fn extract_json_object(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let fenced = &text[start + 7..];
        let body = match fenced.find("```") {
            Some(end) => &fenced[..end],
            None => fenced, // truncated response, fence never closed
        };
        if let Some(obj) = balanced_object(body) {
            return Some(obj.to_string());
        }
    }
    balanced_object(text).map(|s| s.to_string())
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    // Both delimiters are ASCII so the slice is char-safe.
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_response(raw: &str) -> Option<Value> {
    let candidate = extract_json_object(raw)?;
    serde_json::from_str::<Value>(&candidate).ok()
}

/// Normalize an analysis response. Never fails: a response with no usable
/// JSON becomes an empty report carrying the raw text in
/// `general_suggestions`.
pub fn normalize_analysis(raw: &str) -> Normalized<AnalysisReport> {
    let Some(value) = parse_response(raw) else {
        return Normalized {
            report: degraded_analysis(raw),
            degraded: true,
        };
    };

    let vulnerabilities = value
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(vulnerability_from_value).collect())
        .unwrap_or_default();

    let gas_analysis = gas_entries(&value, &["gas_analysis", "gas_analysis_per_function"]);

    let report = AnalysisReport {
        vulnerabilities,
        gas_analysis,
        security_score: score_field(&value, "security_score"),
        quality_score: score_field(&value, "quality_score"),
        general_suggestions: string_list(&value, &["general_suggestions", "suggestions"]),
        original_gas: u64_field(&value, &["original_gas", "total_original_gas"]),
        optimized_gas: u64_field(&value, &["optimized_gas", "total_optimized_gas"]),
        // Recomputed by the gas pass; model arithmetic is advisory only.
        savings: None,
        savings_percent: None,
    };

    Normalized {
        report,
        degraded: false,
    }
}

/// Normalize a rewrite response. A response without rewritten code is
/// well-typed but degraded: the caller must not present it as a successful
/// rewrite.
pub fn normalize_rewrite(raw: &str) -> Normalized<RewriteReport> {
    let Some(value) = parse_response(raw) else {
        return Normalized {
            report: RewriteReport {
                suggestions: raw_excerpt(raw),
                ..Default::default()
            },
            degraded: true,
        };
    };

    let rewritten_code = str_field(&value, &["rewritten_code", "optimized_code", "code"]);

    let gas_value = value
        .get("gas_optimization_details")
        .or_else(|| value.get("gas"))
        .cloned()
        .unwrap_or(Value::Null);

    let report = RewriteReport {
        suggestions: string_list(&value, &["suggestions", "optimizations"]),
        gas: crate::model::GasDelta {
            original_gas: u64_field(&gas_value, &["original_gas", "original"]),
            optimized_gas: u64_field(&gas_value, &["optimized_gas", "optimized"]),
            savings: None,
            savings_percent: None,
        },
        security_improvements: string_list(&value, &["security_improvements"]),
        rewritten_code: rewritten_code.clone(),
    };

    Normalized {
        degraded: rewritten_code.trim().is_empty(),
        report,
    }
}

/// Normalize a generation response. Degraded exactly when no code came
/// back, so non-empty `generated_code` and success always travel together.
pub fn normalize_generation(raw: &str) -> Normalized<GenerationOutput> {
    let Some(value) = parse_response(raw) else {
        return Normalized {
            report: GenerationOutput {
                generation_notes: raw_excerpt(raw),
                ..Default::default()
            },
            degraded: true,
        };
    };

    let generated_code = str_field(&value, &["generated_code", "code", "contract_code"]);

    let report = GenerationOutput {
        generated_code: generated_code.clone(),
        description: str_field(&value, &["description"]),
        features: string_list(&value, &["features"]),
        confidence_score: confidence_field(&value),
        generation_notes: string_list(&value, &["generation_notes", "notes"]),
    };

    Normalized {
        degraded: generated_code.trim().is_empty(),
        report,
    }
}

fn degraded_analysis(raw: &str) -> AnalysisReport {
    AnalysisReport {
        general_suggestions: raw_excerpt(raw),
        ..Default::default()
    }
}

/// Preserve the unparseable response for the caller instead of dropping it.
fn raw_excerpt(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

fn vulnerability_from_value(item: &Value) -> Vulnerability {
    Vulnerability {
        vulnerability_type: str_field(item, &["type", "vulnerability_type", "name"]),
        severity: item
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::parse_lenient)
            .unwrap_or_default(),
        line: item
            .get("line")
            .or_else(|| item.get("line_number"))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        description: str_field(item, &["description"]),
        recommendation: str_field(item, &["recommendation", "fix", "mitigation"]),
    }
}

fn gas_entries(value: &Value, keys: &[&str]) -> Vec<GasFunctionAnalysis> {
    let Some(items) = keys
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let function_name = str_field(item, &["function_name", "function", "name"]);
            if function_name.is_empty() {
                return None;
            }
            Some(GasFunctionAnalysis {
                function_name,
                original_gas: u64_field(item, &["original_gas", "original"]),
                optimized_gas: u64_field(item, &["optimized_gas", "optimized"]),
                savings: None,
                savings_percent: None,
                provenance: GasProvenance::AiEstimate,
            })
        })
        .collect()
}

fn str_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match value.get(*key) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect();
            }
            Some(Value::String(s)) => return vec![s.clone()],
            _ => continue,
        }
    }
    Vec::new()
}

/// Gas figures may arrive as numbers or numeric strings.
fn u64_field(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match value.get(*k) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

fn score_field(value: &Value, key: &str) -> Option<u8> {
    let n = match value.get(key) {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(n.clamp(0.0, 100.0).round() as u8)
}

fn confidence_field(value: &Value) -> f64 {
    let raw = match value.get("confidence_score").or_else(|| value.get("confidence")) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => return 0.0,
    };
    // Some models answer on a 0-100 scale.
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}
