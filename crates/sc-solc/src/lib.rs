//! Solidity compiler adapter
//!
//! Wraps the external `solc` toolchain behind the pipeline's
//! `CompilerBackend` seam. Compilation is best-effort: a missing binary,
//! a timeout or bad source all degrade into a `CompilationResult` with
//! `success = false` instead of failing the request. Version switches via
//! `svm` mutate the globally active solc, so they run behind an exclusive
//! toolchain gate held through the compile; a concurrent switch can never
//! change the active compiler under a running request.

use async_trait::async_trait;
use sc_core::{CompilationResult, CompilerBackend, GasFunctionAnalysis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("compiler not found: {0}")]
    NotFound(String),

    #[error("compiler execution failed: {0}")]
    ExecutionFailed(String),

    #[error("compiler timeout after {0} seconds")]
    Timeout(u64),

    #[error("unreadable compiler output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CompilerResult<T> = Result<T, CompilerError>;

/// Compiler adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolcConfig {
    /// Explicit solc path (otherwise resolved from PATH)
    pub solc_path: Option<PathBuf>,
    /// Explicit svm path for version switching
    pub svm_path: Option<PathBuf>,
    /// Timeout for one compile invocation (seconds)
    pub timeout_secs: u64,
    /// Timeout for a version install (seconds)
    pub install_timeout_secs: u64,
}

impl Default for SolcConfig {
    fn default() -> Self {
        Self {
            solc_path: None,
            svm_path: None,
            timeout_secs: 15,
            install_timeout_secs: 120,
        }
    }
}

/// solc tool wrapper
pub struct SolcCompiler {
    config: SolcConfig,
    executable: Option<PathBuf>,
    svm: Option<PathBuf>,
    toolchain_gate: RwLock<()>,
}

impl SolcCompiler {
    pub fn new(config: SolcConfig) -> Self {
        let executable = config
            .solc_path
            .clone()
            .or_else(|| which::which("solc").ok());
        let svm = config.svm_path.clone().or_else(|| which::which("svm").ok());

        Self {
            config,
            executable,
            svm,
            toolchain_gate: RwLock::new(()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.executable.is_some()
    }

    /// Version of the currently installed solc, e.g. "0.8.26"
    pub async fn installed_version(&self) -> Option<String> {
        let exe = self.executable.as_ref()?;
        let (stdout, _, _) = self
            .run(exe.clone(), &["--version"], None, 10)
            .await
            .ok()?;
        parse_version_output(&stdout)
    }

    /// Compile source through `solc --standard-json`, degrading on any
    /// adapter-level failure.
    pub async fn compile_source(
        &self,
        source: &str,
        requested_version: Option<&str>,
    ) -> CompilationResult {
        let Some(exe) = self.executable.clone() else {
            warn!("solc executable not found, skipping compilation");
            return CompilationResult::degraded("solc executable not found; compilation skipped");
        };

        // A versioned request may switch the globally active solc, so it
        // holds the gate exclusively from the version check through the
        // spawn. Unversioned requests share the gate.
        let mut warnings = Vec::new();
        let _exclusive;
        let _shared;
        match requested_version {
            Some(version) => {
                _exclusive = self.toolchain_gate.write().await;
                if let Some(notice) = self.ensure_version(version).await {
                    warn!("{}", notice);
                    warnings.push(notice);
                }
            }
            None => _shared = self.toolchain_gate.read().await,
        }

        let input = standard_json_input(source);
        match self
            .run(exe, &["--standard-json"], Some(&input), self.config.timeout_secs)
            .await
        {
            Ok((stdout, stderr, _code)) => {
                if !stderr.trim().is_empty() {
                    debug!("solc stderr: {}", stderr.trim());
                }
                let mut result = parse_standard_json(&stdout);
                result.warnings.splice(0..0, warnings);
                result
            }
            Err(e) => {
                warn!("compiler invocation failed: {}", e);
                let mut result =
                    CompilationResult::degraded(format!("compiler invocation failed: {}", e));
                result.warnings.splice(0..0, warnings);
                result
            }
        }
    }

    /// Switch the active solc to the requested version when possible. The
    /// caller holds the toolchain gate exclusively, so the active version
    /// cannot change between this check and the compile. Returns a warning
    /// when the requested version will not be used; never a hard failure.
    async fn ensure_version(&self, requested: &str) -> Option<String> {
        let requested = requested.trim().trim_start_matches('v').to_string();
        let installed = self.installed_version().await;
        if installed.as_deref() == Some(requested.as_str()) {
            return None;
        }

        let Some(svm) = self.svm.clone() else {
            return Some(format!(
                "requested compiler {} but {} is installed and svm is unavailable; proceeding with installed version",
                requested,
                installed.as_deref().unwrap_or("no version")
            ));
        };

        for subcommand in ["install", "use"] {
            if let Err(e) = self
                .run(
                    svm.clone(),
                    &[subcommand, &requested],
                    None,
                    self.config.install_timeout_secs,
                )
                .await
            {
                return Some(format!(
                    "could not switch to compiler {} ({}); proceeding with installed version",
                    requested, e
                ));
            }
        }

        match self.installed_version().await {
            Some(active) if active == requested => None,
            active => Some(format!(
                "requested compiler {} but {} is active after install; proceeding",
                requested,
                active.as_deref().unwrap_or("no version")
            )),
        }
    }

    /// Run the toolchain with a bounded timeout, optionally feeding stdin.
    async fn run(
        &self,
        exe: PathBuf,
        args: &[&str],
        stdin: Option<&str>,
        timeout_secs: u64,
    ) -> CompilerResult<(String, String, i32)> {
        let mut command = Command::new(&exe);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command
            .spawn()
            .map_err(|e| CompilerError::ExecutionFailed(format!("{}: {}", exe.display(), e)))?;

        if let Some(input) = stdin {
            let mut handle = child
                .stdin
                .take()
                .ok_or_else(|| CompilerError::ExecutionFailed("stdin unavailable".to_string()))?;
            handle.write_all(input.as_bytes()).await?;
            drop(handle);
        }

        let output = timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| CompilerError::Timeout(timeout_secs))?
            .map_err(|e| CompilerError::ExecutionFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        Ok((stdout, stderr, code))
    }
}

#[async_trait]
impl CompilerBackend for SolcCompiler {
    async fn compile(&self, source: &str, requested_version: Option<&str>) -> CompilationResult {
        self.compile_source(source, requested_version).await
    }
}

const SOURCE_NAME: &str = "contract.sol";

fn standard_json_input(source: &str) -> String {
    serde_json::json!({
        "language": "Solidity",
        "sources": {
            "contract.sol": { "content": source }
        },
        "settings": {
            "outputSelection": {
                "*": { "*": ["abi", "evm.bytecode.object", "evm.gasEstimates"] }
            }
        }
    })
    .to_string()
}

/// Parse `solc --standard-json` output into a `CompilationResult`.
fn parse_standard_json(stdout: &str) -> CompilationResult {
    let value: serde_json::Value = match serde_json::from_str(stdout) {
        Ok(v) => v,
        Err(e) => {
            return CompilationResult::degraded(format!("unreadable compiler output: {}", e));
        }
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    if let Some(diagnostics) = value.get("errors").and_then(|v| v.as_array()) {
        for diagnostic in diagnostics {
            let message = diagnostic
                .get("formattedMessage")
                .or_else(|| diagnostic.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown diagnostic")
                .trim()
                .to_string();
            match diagnostic.get("severity").and_then(|v| v.as_str()) {
                Some("error") => errors.push(message),
                _ => warnings.push(message),
            }
        }
    }

    let mut abi = None;
    let mut bytecode = None;
    let mut gas_estimates = Vec::new();
    if let Some(contracts) = value
        .get("contracts")
        .and_then(|v| v.get(SOURCE_NAME))
        .and_then(|v| v.as_object())
    {
        // Standard JSON keys output per contract; one source file in, so
        // take the first contract emitted.
        if let Some((_name, contract)) = contracts.iter().next() {
            abi = contract.get("abi").cloned();
            bytecode = contract
                .pointer("/evm/bytecode/object")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if let Some(external) = contract
                .pointer("/evm/gasEstimates/external")
                .and_then(|v| v.as_object())
            {
                for (signature, estimate) in external {
                    // "infinite" estimates carry no usable figure.
                    if let Some(gas) = estimate.as_str().and_then(|s| s.parse::<u64>().ok()) {
                        gas_estimates.push(GasFunctionAnalysis::compiler(signature.clone(), gas));
                    }
                }
            }
        }
    }

    CompilationResult {
        success: errors.is_empty(),
        abi,
        bytecode,
        warnings,
        errors,
        gas_estimates,
    }
}

/// Parse `solc --version` output, e.g.
/// "Version: 0.8.26+commit.8a97fa7a.Linux.g++" -> "0.8.26"
fn parse_version_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Version: "))
        .map(|rest| {
            rest.split('+')
                .next()
                .unwrap_or(rest)
                .trim()
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::GasProvenance;

    const SUCCESS_OUTPUT: &str = r#"{
        "errors": [
            {"severity": "warning", "formattedMessage": "Warning: SPDX license identifier not provided"}
        ],
        "contracts": {
            "contract.sol": {
                "Vault": {
                    "abi": [{"type": "function", "name": "withdraw"}],
                    "evm": {
                        "bytecode": {"object": "6080604052"},
                        "gasEstimates": {
                            "external": {
                                "withdraw()": "48231",
                                "deposit()": "infinite"
                            }
                        }
                    }
                }
            }
        }
    }"#;

    const FAILURE_OUTPUT: &str = r#"{
        "errors": [
            {"severity": "error", "type": "ParserError", "formattedMessage": "ParserError: Expected ';' but got '}'"}
        ]
    }"#;

    #[test]
    fn parses_successful_compile() {
        let result = parse_standard_json(SUCCESS_OUTPUT);
        assert!(result.success);
        assert_eq!(result.bytecode.as_deref(), Some("6080604052"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.errors.is_empty());

        // "infinite" is skipped, numeric estimates are compiler-tagged.
        assert_eq!(result.gas_estimates.len(), 1);
        assert_eq!(result.gas_estimates[0].function_name, "withdraw()");
        assert_eq!(result.gas_estimates[0].original_gas, Some(48231));
        assert_eq!(result.gas_estimates[0].provenance, GasProvenance::Compiler);
    }

    #[test]
    fn parses_syntax_errors_into_degraded_result() {
        let result = parse_standard_json(FAILURE_OUTPUT);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("ParserError"));
        assert!(result.gas_estimates.is_empty());
    }

    #[test]
    fn unreadable_output_degrades() {
        let result = parse_standard_json("Segmentation fault");
        assert!(!result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("unreadable compiler output"));
    }

    #[test]
    fn parses_version_line() {
        let stdout = "solc, the solidity compiler commandline interface\nVersion: 0.8.26+commit.8a97fa7a.Linux.g++\n";
        assert_eq!(parse_version_output(stdout), Some("0.8.26".to_string()));
        assert_eq!(parse_version_output("no version here"), None);
    }

    #[test]
    fn standard_json_input_embeds_source() {
        let input = standard_json_input("contract A {}");
        let value: serde_json::Value = serde_json::from_str(&input).unwrap();
        assert_eq!(value["language"], "Solidity");
        assert_eq!(value["sources"]["contract.sol"]["content"], "contract A {}");
    }

    #[tokio::test]
    async fn missing_executable_degrades_instead_of_failing() {
        let compiler = SolcCompiler::new(SolcConfig {
            solc_path: Some(PathBuf::from("/nonexistent/solc-binary")),
            ..Default::default()
        });
        let result = compiler.compile_source("contract A {}", None).await;
        assert!(!result.success);
        assert!(!result.warnings.is_empty());
    }

    /// Stand-in solc: answers `--version` with 0.8.26 and emits an empty
    /// standard-JSON object for anything else.
    #[cfg(unix)]
    fn fake_solc(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("solc");
        std::fs::write(
            &path,
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then\n  echo \"Version: 0.8.26+commit.test\"\nelse\n  cat > /dev/null\n  echo '{}'\nfi\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn versioned_compile_waits_for_exclusive_toolchain_access() {
        use std::sync::Arc;

        let dir = std::env::temp_dir().join(format!("solc-gate-{}", std::process::id()));
        let compiler = Arc::new(SolcCompiler::new(SolcConfig {
            solc_path: Some(fake_solc(&dir)),
            svm_path: Some(PathBuf::from("/nonexistent/svm")),
            ..Default::default()
        }));

        let held = compiler.toolchain_gate.write().await;
        let task = {
            let compiler = compiler.clone();
            tokio::spawn(async move {
                compiler.compile_source("contract A {}", Some("0.8.26")).await
            })
        };

        // The versioned compile cannot start while another request holds
        // the toolchain exclusively.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        drop(held);
        let result = task.await.unwrap();
        assert!(result.success);
        assert!(result.warnings.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_mismatch_without_usable_svm_warns_and_compiles() {
        let dir = std::env::temp_dir().join(format!("solc-mismatch-{}", std::process::id()));
        let compiler = SolcCompiler::new(SolcConfig {
            solc_path: Some(fake_solc(&dir)),
            svm_path: Some(PathBuf::from("/nonexistent/svm")),
            ..Default::default()
        });

        let result = compiler.compile_source("contract A {}", Some("0.7.6")).await;
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("0.7.6"));
        assert!(result.warnings[0].contains("proceeding with installed version"));
    }
}
