use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{Notify, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::deps::are_dependencies_satisfied;
use crate::log_buffer::DEFAULT_LOG_BUFFER_SIZE;
use crate::output::{LineSplitter, OutputCapture};
use crate::probe;
use crate::profile::{PsSampler, ResourceSampler};
use crate::record::{ProcessHandle, ProcessRecord};
use crate::types::*;

pub struct SupervisorConfig {
	pub log_buffer_size: usize,
	pub readiness_interval: Duration,
	pub probe_timeout: Duration,
	pub profile_interval: Duration,
	/// Grace period between SIGTERM and SIGKILL.
	pub kill_timeout: Duration,
	/// How long an exited child's output readers may keep draining before the
	/// exit is reported.
	pub output_flush_timeout: Duration,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			log_buffer_size: DEFAULT_LOG_BUFFER_SIZE,
			readiness_interval: Duration::from_secs(1),
			probe_timeout: Duration::from_secs(3),
			profile_interval: Duration::from_secs(2),
			kill_timeout: Duration::from_secs(5),
			output_flush_timeout: Duration::from_millis(250),
		}
	}
}

/// Owns every process record and is the only thing that mutates them.
///
/// Records are kept in display order: startup hook, regular processes in
/// declaration order, shutdown hook. State changes that can unblock a pending
/// process (ready, success, probe-less running) wake the re-scan loop through a
/// [`Notify`], which holds at most one permit, so a burst of changes results in
/// one scheduling pass.
pub struct Supervisor {
	records: RwLock<Vec<ProcessRecord>>,
	pub config: SupervisorConfig,
	names: Vec<String>,
	index: HashMap<String, usize>,
	sampler: Arc<dyn ResourceSampler>,
	rescan: Arc<Notify>,
	started: AtomicBool,
	shutting_down: AtomicBool,
	selected: AtomicUsize,
}

/// Everything needed to spawn a record that has just been moved to `Starting`.
struct Launch {
	idx: usize,
	run_id: u64,
	name: String,
	command: String,
	env: HashMap<String, String>,
	output: OutputCapture,
}

impl Supervisor {
	pub fn new(set: ProcessSet, config: SupervisorConfig) -> Arc<Self> {
		Self::with_sampler(set, config, Arc::new(PsSampler))
	}

	pub fn with_sampler(
		set: ProcessSet,
		config: SupervisorConfig,
		sampler: Arc<dyn ResourceSampler>,
	) -> Arc<Self> {
		let size = config.log_buffer_size;
		let mut records = Vec::with_capacity(set.process.len() + 2);

		if let Some(hook) = &set.hooks.startup {
			records.push(ProcessRecord::from_hook(hook, ProcessKind::StartupHook, size));
		}
		for spec in &set.process {
			records.push(ProcessRecord::from_spec(spec, size));
		}
		if let Some(hook) = &set.hooks.shutdown {
			records.push(ProcessRecord::from_hook(hook, ProcessKind::ShutdownHook, size));
		}

		let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
		let index = names
			.iter()
			.enumerate()
			.map(|(i, name)| (name.clone(), i))
			.collect();

		Arc::new(Self {
			records: RwLock::new(records),
			config,
			names,
			index,
			sampler,
			rescan: Arc::new(Notify::new()),
			started: AtomicBool::new(false),
			shutting_down: AtomicBool::new(false),
			selected: AtomicUsize::new(0),
		})
	}

	// ── Read access ─────────────────────────────────────────────────────────

	pub fn names(&self) -> &[String] {
		&self.names
	}

	pub async fn status(&self) -> Vec<ProcessStatus> {
		let records = self.records.read().await;
		records.iter().map(|r| r.status()).collect()
	}

	pub async fn process_status(&self, name: &str) -> Option<ProcessStatus> {
		let idx = *self.index.get(name)?;
		let records = self.records.read().await;
		Some(records[idx].status())
	}

	pub async fn output(&self, name: &str) -> Option<OutputCapture> {
		let idx = *self.index.get(name)?;
		let records = self.records.read().await;
		Some(records[idx].output.clone())
	}

	fn index_of(&self, name: &str) -> Result<usize, String> {
		self.index
			.get(name)
			.copied()
			.ok_or_else(|| format!("{}: not found", name))
	}

	async fn state_at(&self, idx: usize) -> ProcessState {
		self.records.read().await[idx].state
	}

	async fn find_kind(&self, kind: ProcessKind) -> Option<usize> {
		let records = self.records.read().await;
		records.iter().position(|r| r.kind == kind)
	}

	// ── Scheduling ──────────────────────────────────────────────────────────

	/// Starts the re-scan loop, launches the startup hook and requests the
	/// first scheduling pass. Calling it again does nothing.
	pub async fn start(self: &Arc<Self>) {
		if self.started.swap(true, Ordering::SeqCst) {
			return;
		}

		let weak = Arc::downgrade(self);
		let rescan = Arc::clone(&self.rescan);
		tokio::spawn(async move {
			loop {
				rescan.notified().await;
				let Some(sup) = weak.upgrade() else {
					return;
				};
				sup.run_pending_processes().await;
			}
		});

		if self.find_kind(ProcessKind::StartupHook).await.is_some() {
			let sup = Arc::clone(self);
			tokio::spawn(async move {
				sup.run_startup_hook().await;
			});
		}

		self.request_rescan();
	}

	/// Asks the re-scan loop for another pass. Requests made before the loop
	/// wakes up are merged into one.
	pub fn request_rescan(&self) {
		self.rescan.notify_one();
	}

	/// Launches every pending regular process whose gates are open. Returns how
	/// many were started.
	pub async fn run_pending_processes(self: &Arc<Self>) -> usize {
		if self.shutting_down.load(Ordering::SeqCst) {
			return 0;
		}

		let launches: Vec<Launch> = {
			let mut records = self.records.write().await;
			let startup_done = records
				.iter()
				.find(|r| r.kind == ProcessKind::StartupHook)
				.map_or(true, |hook| hook.state == ProcessState::Success);
			if !startup_done {
				return 0;
			}

			let runnable: Vec<usize> = records
				.iter()
				.enumerate()
				.filter(|(_, r)| {
					r.kind == ProcessKind::Process
						&& r.state == ProcessState::Pending
						&& are_dependencies_satisfied(r, &records)
				})
				.map(|(i, _)| i)
				.collect();

			runnable
				.into_iter()
				.map(|i| claim(i, &mut records[i]))
				.collect()
		};

		let count = launches.len();
		for launch in launches {
			self.launch(launch).await;
		}
		count
	}

	// ── Lifecycle ───────────────────────────────────────────────────────────

	/// Spawns the named record unless it already has a live child. Returns the
	/// child's handle, or `None` if nothing was started or the spawn failed.
	pub async fn exec_process(self: &Arc<Self>, name: &str) -> Option<ProcessHandle> {
		let idx = *self.index.get(name)?;
		self.exec_where(idx, |record| !record.state.is_active()).await
	}

	async fn exec_where(
		self: &Arc<Self>,
		idx: usize,
		prepare: impl FnOnce(&mut ProcessRecord) -> bool,
	) -> Option<ProcessHandle> {
		let launch = {
			let mut records = self.records.write().await;
			let record = &mut records[idx];
			if !prepare(record) {
				return None;
			}
			claim(idx, record)
		};
		self.launch(launch).await
	}

	async fn launch(self: &Arc<Self>, launch: Launch) -> Option<ProcessHandle> {
		let Launch {
			idx,
			run_id,
			name,
			command,
			env,
			output,
		} = launch;

		output.clear().await;

		let mut child = match spawn_process(&command, &env) {
			Ok(c) => c,
			Err(e) => {
				tracing::warn!("{}: failed to spawn: {}", name, e);
				output
					.write_line(format!("[noroi] failed to spawn {}: {}", name, e))
					.await;
				self.update(idx, run_id, |record| record.finish_run(ProcessState::Error))
					.await;
				return None;
			}
		};

		let pid = child.id().unwrap_or(0);
		let (handle, notifier) = ProcessHandle::new(pid);
		tracing::info!("{}: started (pid {})", name, pid);

		let mut pipes = JoinSet::new();
		if let Some(stdout) = child.stdout.take() {
			pipes.spawn(pipe_output(stdout, output.clone()));
		}
		if let Some(stderr) = child.stderr.take() {
			pipes.spawn(pipe_output(stderr, output.clone()));
		}

		let running = self
			.update(idx, run_id, |record| {
				record.handle = Some(handle.clone());
				match record.readiness_probe.clone() {
					Some(probe) => {
						record.readiness_task = Some(self.spawn_readiness(idx, run_id, probe));
						false
					}
					None => {
						record.state = ProcessState::Running;
						record.profile_task = Some(self.spawn_profiler(idx, run_id, pid));
						true
					}
				}
			})
			.await
			.unwrap_or(false);

		if running {
			tracing::info!("{}: running", name);
			self.request_rescan();
		}

		let sup = Arc::clone(self);
		tokio::spawn(async move {
			let status = child.wait().await;
			let _ = notifier.reaped.send(true);

			// give the readers a moment to drain what the child wrote last
			let drained = tokio::time::timeout(sup.config.output_flush_timeout, async {
				while pipes.join_next().await.is_some() {}
			})
			.await;
			if drained.is_err() {
				pipes.detach_all();
			}

			let code = match status {
				Ok(status) => status
					.code()
					.or_else(|| status.signal().map(|sig| 128 + sig))
					.unwrap_or(-1),
				Err(e) => {
					output
						.write_line(format!("[noroi] {} error: {}", name, e))
						.await;
					-1
				}
			};

			sup.on_exit(idx, run_id, &name, code, &output).await;
			let _ = notifier.exit.send(Some(code));
		});

		Some(handle)
	}

	async fn on_exit(&self, idx: usize, run_id: u64, name: &str, code: i32, output: &OutputCapture) {
		let outcome = self
			.update(idx, run_id, |record| {
				record.exit_code = Some(code);
				// a kill in progress finishes the record itself
				if record.state == ProcessState::Killing {
					return None;
				}
				let state = if code == 0 {
					ProcessState::Success
				} else {
					ProcessState::Error
				};
				record.finish_run(state);
				Some(state)
			})
			.await
			.flatten();

		match outcome {
			Some(ProcessState::Success) => {
				tracing::info!("{}: exited cleanly", name);
				output
					.write_line(format!("[noroi] {} exited cleanly", name))
					.await;
				self.request_rescan();
			}
			Some(_) => {
				tracing::info!("{}: failed (exit {})", name, code);
				output
					.write_line(format!("[noroi] {} failed (exit {})", name, code))
					.await;
			}
			None => {}
		}
	}

	fn spawn_readiness(self: &Arc<Self>, idx: usize, run_id: u64, probe: ReadinessProbe) -> JoinHandle<()> {
		let sup = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(sup.config.readiness_interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let claimed = sup
					.update(idx, run_id, |record| {
						let probing = matches!(record.state, ProcessState::Starting | ProcessState::Running);
						if !probing || record.probe_in_flight {
							return false;
						}
						record.probe_in_flight = true;
						true
					})
					.await;
				match claimed {
					None => return,
					Some(false) => continue,
					Some(true) => {}
				}

				let ready = probe::run_probe(&probe, sup.config.probe_timeout).await;
				tracing::debug!("readiness probe {} -> {}", probe.describe(), ready);
				sup.apply_readiness(idx, run_id, ready).await;
			}
		})
	}

	async fn apply_readiness(self: &Arc<Self>, idx: usize, run_id: u64, ready: bool) {
		let became_ready = self
			.update(idx, run_id, |record| {
				record.probe_in_flight = false;
				if !matches!(record.state, ProcessState::Starting | ProcessState::Running) {
					return false;
				}

				let was_ready = record.is_ready == Some(true);
				record.is_ready = Some(ready);
				if !ready {
					return false;
				}

				if record.state == ProcessState::Starting {
					record.state = ProcessState::Running;
					tracing::info!("{}: ready", record.name);
				}
				if record.profile_task.is_none() {
					if let Some(pid) = record.pid() {
						record.profile_task = Some(self.spawn_profiler(idx, run_id, pid));
					}
				}
				!was_ready
			})
			.await
			.unwrap_or(false);

		if became_ready {
			self.request_rescan();
		}
	}

	fn spawn_profiler(self: &Arc<Self>, idx: usize, run_id: u64, pid: u32) -> JoinHandle<()> {
		let sup = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(sup.config.profile_interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			ticker.tick().await;

			loop {
				ticker.tick().await;
				let Some(usage) = sup.sampler.sample(pid).await else {
					continue;
				};
				let profile = ResourceProfile {
					memory_mb: usage.memory_mb,
					cpu_percent: usage.cpu_percent,
					sampled_at: SystemTime::now(),
				};
				if sup.update(idx, run_id, |record| record.profile = Some(profile)).await.is_none() {
					return;
				}
			}
		})
	}

	/// Applies `f` to the record if it is still on run `run_id`. Timers and exit
	/// watchers of an earlier run get `None` and must stop.
	async fn update<R>(
		&self,
		idx: usize,
		run_id: u64,
		f: impl FnOnce(&mut ProcessRecord) -> R,
	) -> Option<R> {
		let mut records = self.records.write().await;
		let record = records.get_mut(idx)?;
		if record.run_id != run_id {
			return None;
		}
		Some(f(record))
	}

	/// SIGTERM, then SIGKILL after `kill_timeout` if the child is still alive.
	/// Waits for the child to exit and leaves the record `Killed`.
	pub async fn kill_process(self: &Arc<Self>, name: &str) -> Result<String, String> {
		let idx = self.index_of(name)?;

		let (mut handle, run_id, output) = {
			let mut records = self.records.write().await;
			let record = &mut records[idx];
			let killable = matches!(record.state, ProcessState::Starting | ProcessState::Running);
			let handle = match (&record.handle, killable) {
				(Some(handle), true) => handle.clone(),
				_ => return Ok(format!("{}: not running", name)),
			};
			record.state = ProcessState::Killing;
			record.stop_timers();
			(handle, record.run_id, record.output.clone())
		};

		tracing::info!("{}: stopping (pid {})", name, handle.pid);
		signal_group(handle.pid, nix::sys::signal::Signal::SIGTERM);

		let grace = self.config.kill_timeout;
		if tokio::time::timeout(grace, handle.wait_reaped()).await.is_err() {
			tracing::warn!("{}: still alive after {:?}, sending SIGKILL", name, grace);
			output
				.write_line(format!(
					"[noroi] {} did not exit within {:?}, sending SIGKILL",
					name, grace
				))
				.await;
			signal_group(handle.pid, nix::sys::signal::Signal::SIGKILL);
		}
		handle.wait().await;

		self.update(idx, run_id, |record| record.finish_run(ProcessState::Killed))
			.await;
		output.write_line(format!("[noroi] {} killed", name)).await;
		tracing::info!("{}: killed", name);
		Ok(format!("{}: killed", name))
	}

	/// Stops scheduling for good, then kills everything and runs the shutdown
	/// hook. Explicit `exec_process`/`restart_process` calls still work.
	pub async fn shutdown(self: &Arc<Self>) {
		self.shutting_down.store(true, Ordering::SeqCst);
		self.kill_all_processes().await;
	}

	/// Kills every regular process concurrently, then runs the shutdown hook.
	/// Pending processes stay schedulable.
	pub async fn kill_all_processes(self: &Arc<Self>) {

		let targets: Vec<String> = {
			let records = self.records.read().await;
			records
				.iter()
				.filter(|r| r.kind == ProcessKind::Process)
				.map(|r| r.name.clone())
				.collect()
		};

		let mut kills = JoinSet::new();
		for name in targets {
			let sup = Arc::clone(self);
			kills.spawn(async move {
				let _ = sup.kill_process(&name).await;
			});
		}
		while kills.join_next().await.is_some() {}

		self.run_shutdown_hook().await;
	}

	/// Kills the record if it is alive, then spawns it again.
	pub async fn restart_process(self: &Arc<Self>, name: &str) -> Result<String, String> {
		let idx = self.index_of(name)?;

		match self.state_at(idx).await {
			ProcessState::Running | ProcessState::Starting => {
				self.kill_process(name).await?;
			}
			ProcessState::Killing => return Ok(format!("{}: already stopping", name)),
			_ => {}
		}

		match self.exec_process(name).await {
			Some(_) => Ok(format!("{}: restarting", name)),
			None => Err(format!("{}: failed to start", name)),
		}
	}

	/// Runs the startup hook if it has not run yet and waits for it to exit.
	pub async fn run_startup_hook(self: &Arc<Self>) -> Option<ProcessState> {
		let idx = self.find_kind(ProcessKind::StartupHook).await?;
		let mut handle = self
			.exec_where(idx, |record| record.state == ProcessState::Pending)
			.await?;
		handle.wait().await;
		Some(self.state_at(idx).await)
	}

	/// Resets the shutdown hook to pending, runs it and waits for it to exit.
	pub async fn run_shutdown_hook(self: &Arc<Self>) -> Option<ProcessState> {
		let idx = self.find_kind(ProcessKind::ShutdownHook).await?;
		let handle = self
			.exec_where(idx, |record| {
				if record.state.is_active() {
					return false;
				}
				record.state = ProcessState::Pending;
				true
			})
			.await;
		if let Some(mut handle) = handle {
			handle.wait().await;
		}
		Some(self.state_at(idx).await)
	}

	// ── Selection ───────────────────────────────────────────────────────────

	pub fn select_process(&self, idx: usize) -> usize {
		let idx = idx.min(self.names.len().saturating_sub(1));
		self.selected.store(idx, Ordering::SeqCst);
		idx
	}

	pub fn selected_index(&self) -> usize {
		self.selected.load(Ordering::SeqCst)
	}

	pub async fn selected_process(&self) -> Option<ProcessStatus> {
		let name = self.names.get(self.selected_index())?;
		self.process_status(name).await
	}

	pub async fn restart_selected_process(self: &Arc<Self>) -> Result<String, String> {
		let name = self.selected_name()?;
		self.restart_process(&name).await
	}

	pub async fn kill_selected_process(self: &Arc<Self>) -> Result<String, String> {
		let name = self.selected_name()?;
		self.kill_process(&name).await
	}

	fn selected_name(&self) -> Result<String, String> {
		self.names
			.get(self.selected_index())
			.cloned()
			.ok_or_else(|| "no process selected".to_string())
	}
}

/// Moves a record into `Starting` for a new run and captures what the spawn
/// needs. Must be called with the record table locked.
fn claim(idx: usize, record: &mut ProcessRecord) -> Launch {
	record.stop_timers();
	record.run_id += 1;
	record.state = ProcessState::Starting;
	record.started_at = Some(SystemTime::now());
	record.exit_code = None;
	record.is_ready = record.readiness_probe.as_ref().map(|_| false);
	record.probe_in_flight = false;
	record.profile = None;
	record.handle = None;

	Launch {
		idx,
		run_id: record.run_id,
		name: record.name.clone(),
		command: record.command.clone(),
		env: record.env.clone(),
		output: record.output.clone(),
	}
}

fn spawn_process(command: &str, env: &HashMap<String, String>) -> std::io::Result<Child> {
	let mut cmd = Command::new("sh");
	cmd.args(["-c", command])
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.envs(env)
		.process_group(0);
	cmd.spawn()
}

async fn pipe_output<R: tokio::io::AsyncRead + Unpin>(mut reader: R, output: OutputCapture) {
	let mut splitter = LineSplitter::new();
	let mut buf = [0u8; 4096];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				for line in splitter.feed(&buf[..n]) {
					output.write_line(line).await;
				}
			}
			Err(e) => {
				output.write_line(format!("Error reading output: {}", e)).await;
				break;
			}
		}
	}
	if let Some(line) = splitter.finish() {
		output.write_line(line).await;
	}
}

/// Signals the child's whole process group so shell children go with it.
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
	use nix::sys::signal::killpg;
	use nix::unistd::Pid;
	if pid == 0 {
		return;
	}
	let _ = killpg(Pid::from_raw(pid as i32), signal);
}
