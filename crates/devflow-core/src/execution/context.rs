//! Per-invocation execution context and result records.
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::kernel::constants::{DEFAULT_EXECUTION_TIMEOUT_SECS, DEFAULT_MEMORY_CAP_BYTES};

const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);
const MIN_MEMORY_CAP_BYTES: u64 = 1;
const MAX_MEMORY_CAP_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// The inputs to one plugin invocation. `working_directory` is the per-invocation
/// scratch directory created by the execution service; it must exist for the
/// lifetime of the call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub working_directory: PathBuf,
    pub input: Value,
    pub parameters: HashMap<String, Value>,
    pub environment: HashMap<String, String>,
    pub timeout: Duration,
    pub memory_cap_bytes: u64,
    pub correlation: String,
}

impl ExecutionContext {
    pub fn new(working_directory: PathBuf, input: Value, correlation: String) -> Self {
        Self {
            working_directory,
            input,
            parameters: HashMap::new(),
            environment: HashMap::new(),
            timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
            memory_cap_bytes: DEFAULT_MEMORY_CAP_BYTES,
            correlation,
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Clamps `timeout` into [1s, 1h].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        self
    }

    /// Clamps `memory_cap_bytes` into [1B, 8GB].
    pub fn with_memory_cap_bytes(mut self, memory_cap_bytes: u64) -> Self {
        self.memory_cap_bytes = memory_cap_bytes.clamp(MIN_MEMORY_CAP_BYTES, MAX_MEMORY_CAP_BYTES);
        self
    }

    /// Serializes the context into the wire shape passed to wrapper scripts and
    /// in-process runtimes: a single JSON object.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "input": self.input,
            "workingDirectory": self.working_directory,
            "environment": self.environment,
            "parameters": self.parameters,
            "correlation": self.correlation,
            "timeoutSecs": self.timeout.as_secs(),
            "memoryCapBytes": self.memory_cap_bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
}

/// Outcome of one invocation, regardless of which runtime manager handled it.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<ExecutionError>,
    pub logs: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub peak_memory_bytes: Option<u64>,
    pub exit_code: Option<i32>,
    pub metadata: HashMap<String, Value>,
}

impl ExecutionResult {
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }

    pub fn success(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        output: Value,
        logs: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            logs,
            started_at,
            ended_at,
            peak_memory_bytes: None,
            exit_code: Some(0),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        code: impl Into<String>,
        message: impl Into<String>,
        logs: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(ExecutionError {
                code: code.into(),
                message: message.into(),
            }),
            logs,
            started_at,
            ended_at,
            peak_memory_bytes: None,
            exit_code: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_peak_memory_bytes(mut self, peak_memory_bytes: u64) -> Self {
        self.peak_memory_bytes = Some(peak_memory_bytes);
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_memory_cap_clamp_to_bounds() {
        let ctx = ExecutionContext::new(PathBuf::from("/tmp/x"), Value::Null, "corr".to_string())
            .with_timeout(Duration::from_secs(10_000))
            .with_memory_cap_bytes(u64::MAX);
        assert_eq!(ctx.timeout, MAX_TIMEOUT);
        assert_eq!(ctx.memory_cap_bytes, MAX_MEMORY_CAP_BYTES);

        let ctx = ExecutionContext::new(PathBuf::from("/tmp/x"), Value::Null, "corr".to_string())
            .with_timeout(Duration::from_millis(1))
            .with_memory_cap_bytes(0);
        assert_eq!(ctx.timeout, MIN_TIMEOUT);
        assert_eq!(ctx.memory_cap_bytes, MIN_MEMORY_CAP_BYTES);
    }

    #[test]
    fn defaults_match_five_minutes_and_256_mebibytes() {
        let ctx = ExecutionContext::new(PathBuf::from("/tmp/x"), Value::Null, "corr".to_string());
        assert_eq!(ctx.timeout, Duration::from_secs(300));
        assert_eq!(ctx.memory_cap_bytes, 256 * 1024 * 1024);
    }
}
