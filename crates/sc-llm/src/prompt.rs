//! Prompt templates for the three contract operations
//!
//! Each template embeds the request's constraints and ends with an explicit
//! output-format instruction. The model is asked for a single JSON object;
//! whatever actually comes back is treated as untrusted text downstream.

use sc_core::{AnalyzeRequest, GenerateRequest, RewriteRequest};

pub const SYSTEM_PROMPT: &str = "You are an expert Solidity auditor and smart-contract engineer. \
Respond with a single JSON object and no surrounding prose.";

pub fn analyze_prompt(request: &AnalyzeRequest) -> String {
    format!(
        r#"Analyze the following Solidity contract{name} for security vulnerabilities, code quality and gas usage.

```solidity
{source}
```

Respond with exactly one JSON object of this shape:
{{
  "vulnerabilities": [
    {{"type": "<tag>", "severity": "low|medium|high|critical", "line": <number or null>, "description": "...", "recommendation": "..."}}
  ],
  "gas_analysis": [
    {{"function_name": "<signature>", "original_gas": <number>, "optimized_gas": <number>}}
  ],
  "security_score": <0-100>,
  "quality_score": <0-100>,
  "general_suggestions": ["..."],
  "original_gas": <number>,
  "optimized_gas": <number>
}}"#,
        name = named(&request.contract_name),
        source = request.source_code,
    )
}

pub fn rewrite_prompt(request: &RewriteRequest) -> String {
    let goals = if request.optimization_goals.is_empty() {
        "minimize gas usage".to_string()
    } else {
        request.optimization_goals.join(", ")
    };
    let preserve = if request.preserve_functionality {
        "The rewrite MUST preserve the contract's observable behavior exactly."
    } else {
        "Behavior-changing optimizations are acceptable when they reduce gas."
    };

    format!(
        r#"Rewrite the following Solidity contract{name} to achieve these optimization goals: {goals}.
{preserve}

```solidity
{source}
```

Respond with exactly one JSON object of this shape:
{{
  "rewritten_code": "<full optimized contract source>",
  "suggestions": ["..."],
  "security_improvements": ["..."],
  "gas_optimization_details": {{"original_gas": <number>, "optimized_gas": <number>}}
}}"#,
        name = named(&request.contract_name),
        goals = goals,
        preserve = preserve,
        source = request.source_code,
    )
}

pub fn generate_prompt(request: &GenerateRequest) -> String {
    let features = if request.features.is_empty() {
        "none specified".to_string()
    } else {
        request.features.join(", ")
    };

    format!(
        r#"Generate a complete Solidity contract named `{name}` from this description:

{description}

Required features: {features}.

Respond with exactly one JSON object of this shape:
{{
  "generated_code": "<full contract source>",
  "description": "<one-paragraph summary of what was generated>",
  "features": ["..."],
  "confidence_score": <0.0-1.0>,
  "generation_notes": ["..."]
}}"#,
        name = request.contract_name,
        description = request.description,
        features = features,
    )
}

fn named(contract_name: &Option<String>) -> String {
    match contract_name.as_deref() {
        Some(name) if !name.trim().is_empty() => format!(" `{}`", name.trim()),
        _ => String::new(),
    }
}
