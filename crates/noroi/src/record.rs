use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::output::OutputCapture;
use crate::types::*;

/// Live child of a record: its pid and channels that fire once the child has
/// been reaped and once its exit has been recorded (exit code is
/// `128 + signal` when it died from a signal).
#[derive(Clone)]
pub struct ProcessHandle {
	pub pid: u32,
	reaped: watch::Receiver<bool>,
	exit: watch::Receiver<Option<i32>>,
}

/// Sending halves held by the exit watcher of one run.
pub(crate) struct ExitNotifier {
	pub reaped: watch::Sender<bool>,
	pub exit: watch::Sender<Option<i32>>,
}

impl ProcessHandle {
	pub(crate) fn new(pid: u32) -> (Self, ExitNotifier) {
		let (reaped_tx, reaped_rx) = watch::channel(false);
		let (exit_tx, exit_rx) = watch::channel(None);
		(
			Self { pid, reaped: reaped_rx, exit: exit_rx },
			ExitNotifier { reaped: reaped_tx, exit: exit_tx },
		)
	}

	pub fn exit_code(&self) -> Option<i32> {
		*self.exit.borrow()
	}

	/// Waits until the OS has reaped the child. Output may still be draining
	/// and the record may not reflect the exit yet.
	pub async fn wait_reaped(&mut self) {
		let _ = self.reaped.wait_for(|reaped| *reaped).await;
	}

	/// Waits until the child has exited and the exit has been recorded.
	pub async fn wait(&mut self) -> Option<i32> {
		match self.exit.wait_for(|code| code.is_some()).await {
			Ok(code) => *code,
			// sender gone: the watcher task finished without reporting
			Err(_) => None,
		}
	}
}

/// Runtime state for one declared process or hook.
pub struct ProcessRecord {
	pub name: String,
	pub command: String,
	pub kind: ProcessKind,
	pub state: ProcessState,
	pub dependencies: Vec<Dependency>,
	pub env: HashMap<String, String>,
	pub readiness_probe: Option<ReadinessProbe>,
	/// `None` when no readiness probe is configured.
	pub is_ready: Option<bool>,
	pub started_at: Option<SystemTime>,
	pub exit_code: Option<i32>,
	pub profile: Option<ResourceProfile>,
	pub output: OutputCapture,
	pub(crate) handle: Option<ProcessHandle>,
	pub(crate) run_id: u64,
	pub(crate) readiness_task: Option<JoinHandle<()>>,
	pub(crate) profile_task: Option<JoinHandle<()>>,
	pub(crate) probe_in_flight: bool,
}

impl ProcessRecord {
	pub fn from_spec(spec: &ProcessSpec, log_buffer_size: usize) -> Self {
		let mut record = Self::bare(&spec.name, &spec.command, ProcessKind::Process, log_buffer_size);
		record.dependencies = spec.deps.clone();
		record.env = spec
			.env
			.iter()
			.map(|(k, v)| (k.clone(), v.to_string()))
			.collect();
		record.readiness_probe = spec.readiness_probe.clone();
		record.is_ready = spec.readiness_probe.as_ref().map(|_| false);
		record
	}

	pub fn from_hook(hook: &HookSpec, kind: ProcessKind, log_buffer_size: usize) -> Self {
		Self::bare(&hook.name, &hook.command, kind, log_buffer_size)
	}

	fn bare(name: &str, command: &str, kind: ProcessKind, log_buffer_size: usize) -> Self {
		Self {
			name: name.to_string(),
			command: command.to_string(),
			kind,
			state: ProcessState::Pending,
			dependencies: Vec::new(),
			env: HashMap::new(),
			readiness_probe: None,
			is_ready: None,
			started_at: None,
			exit_code: None,
			profile: None,
			output: OutputCapture::new(log_buffer_size),
			handle: None,
			run_id: 0,
			readiness_task: None,
			profile_task: None,
			probe_in_flight: false,
		}
	}

	pub fn pid(&self) -> Option<u32> {
		self.handle.as_ref().map(|h| h.pid)
	}

	pub fn status(&self) -> ProcessStatus {
		ProcessStatus {
			name: self.name.clone(),
			kind: self.kind,
			state: self.state,
			is_ready: self.is_ready,
			pid: self.pid(),
			started_at: self.started_at,
			exit_code: self.exit_code,
			profile: self.profile,
		}
	}

	pub(crate) fn stop_timers(&mut self) {
		if let Some(task) = self.readiness_task.take() {
			task.abort();
		}
		if let Some(task) = self.profile_task.take() {
			task.abort();
		}
	}

	/// Resets everything tied to the run that just ended.
	pub(crate) fn finish_run(&mut self, state: ProcessState) {
		self.stop_timers();
		self.state = state;
		self.handle = None;
		self.is_ready = self.readiness_probe.as_ref().map(|_| false);
		self.probe_in_flight = false;
		self.profile = None;
	}
}
