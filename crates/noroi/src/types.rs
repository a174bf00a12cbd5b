use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

// ── Declared configuration ───────────────────────────────────────────────────

/// The validated process set handed to the supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSet {
	#[serde(default)]
	pub hooks: Hooks,
	#[serde(default)]
	pub process: Vec<ProcessSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
	pub startup: Option<HookSpec>,
	pub shutdown: Option<HookSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
	pub name: String,
	pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
	pub name: String,
	pub command: String,
	#[serde(default)]
	pub readiness_probe: Option<ReadinessProbe>,
	#[serde(default)]
	pub deps: Vec<Dependency>,
	#[serde(default)]
	pub env: HashMap<String, EnvValue>,
}

impl ProcessSpec {
	pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			command: command.into(),
			readiness_probe: None,
			deps: Vec::new(),
			env: HashMap::new(),
		}
	}

	pub fn depends_on(mut self, name: impl Into<String>, condition: Condition) -> Self {
		self.deps.push(Dependency { name: name.into(), condition });
		self
	}

	pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
		self.readiness_probe = Some(probe);
		self
	}

	pub fn with_env(mut self, key: impl Into<String>, value: impl Into<EnvValue>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
	pub name: String,
	pub condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
	Started,
	Succeeded,
	Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadinessProbe {
	Http {
		#[serde(default = "default_host")]
		host: String,
		port: u16,
		#[serde(default = "default_path")]
		path: String,
	},
	Exec {
		command: String,
	},
}

fn default_host() -> String {
	"localhost".into()
}
fn default_path() -> String {
	"/".into()
}

impl ReadinessProbe {
	pub fn describe(&self) -> String {
		match self {
			ReadinessProbe::Http { host, port, path } => http_url(host, *port, path),
			ReadinessProbe::Exec { command } => format!("exec: {}", command),
		}
	}
}

pub(crate) fn http_url(host: &str, port: u16, path: &str) -> String {
	if path.starts_with('/') {
		format!("http://{}:{}{}", host, port, path)
	} else {
		format!("http://{}:{}/{}", host, port, path)
	}
}

/// An environment value as written in config: string, number or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
	Text(String),
	Integer(i64),
	Float(f64),
	Bool(bool),
}

impl fmt::Display for EnvValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EnvValue::Text(s) => f.write_str(s),
			EnvValue::Integer(n) => write!(f, "{}", n),
			EnvValue::Float(n) => write!(f, "{}", n),
			EnvValue::Bool(b) => write!(f, "{}", b),
		}
	}
}

impl From<&str> for EnvValue {
	fn from(s: &str) -> Self {
		EnvValue::Text(s.to_string())
	}
}

impl From<String> for EnvValue {
	fn from(s: String) -> Self {
		EnvValue::Text(s)
	}
}

impl From<i64> for EnvValue {
	fn from(n: i64) -> Self {
		EnvValue::Integer(n)
	}
}

// ── Runtime state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
	Process,
	StartupHook,
	ShutdownHook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
	Pending,
	Starting,
	Running,
	Success,
	Error,
	Killing,
	Killed,
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Running)
	}

	/// A child process exists for this state.
	pub fn is_active(&self) -> bool {
		matches!(self, ProcessState::Starting | ProcessState::Running | ProcessState::Killing)
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, ProcessState::Success | ProcessState::Error | ProcessState::Killed)
	}
}

impl fmt::Display for ProcessState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ProcessState::Pending => "pending",
			ProcessState::Starting => "starting",
			ProcessState::Running => "running",
			ProcessState::Success => "success",
			ProcessState::Error => "error",
			ProcessState::Killing => "killing",
			ProcessState::Killed => "killed",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
	pub memory_mb: u64,
	pub cpu_percent: f64,
	pub sampled_at: SystemTime,
}

/// Read-only view of one process record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
	pub name: String,
	pub kind: ProcessKind,
	pub state: ProcessState,
	pub is_ready: Option<bool>,
	pub pid: Option<u32>,
	pub started_at: Option<SystemTime>,
	pub exit_code: Option<i32>,
	pub profile: Option<ResourceProfile>,
}

impl ProcessStatus {
	pub fn is_running(&self) -> bool {
		self.state.is_running()
	}
}
