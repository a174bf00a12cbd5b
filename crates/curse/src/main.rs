mod config;

use clap::Parser;
use noroi::{OutputCapture, ProcessKind, ProcessState, ProcessStatus, Supervisor, SupervisorConfig};
use owo_colors::{AnsiColors, OwoColorize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const PALETTE: [AnsiColors; 6] = [
	AnsiColors::Cyan,
	AnsiColors::Magenta,
	AnsiColors::Yellow,
	AnsiColors::Green,
	AnsiColors::Blue,
	AnsiColors::BrightRed,
];

#[derive(Parser, Debug)]
#[command(name = "curse", version, about = "Manage processes in your terminal.")]
struct Args {
	/// Config file to load instead of curse.toml / curse.local.toml
	#[arg(short, long)]
	path: Option<PathBuf>,

	/// Lines of output kept per process
	#[arg(long, env = "LOG_BUFFER_SIZE", default_value_t = noroi::log_buffer::DEFAULT_LOG_BUFFER_SIZE)]
	log_buffer_size: usize,

	/// Seconds to wait after SIGTERM before sending SIGKILL
	#[arg(long, env = "CURSE_KILL_TIMEOUT", default_value_t = 5)]
	kill_timeout: u64,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("curse=info,noroi=info")),
		)
		.with_writer(std::io::stderr)
		.init();

	let cwd = match std::env::current_dir() {
		Ok(dir) => dir,
		Err(e) => {
			eprintln!("{} cannot read current directory: {}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	};
	let loaded = config::resolve_config_path(args.path.as_deref(), &cwd)
		.and_then(|path| config::load_config(&path).map(|set| (path, set)));
	let (path, set) = match loaded {
		Ok(v) => v,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	};
	tracing::info!("loaded {} ({} processes)", path.display(), set.process.len());

	let sup = Supervisor::new(
		set,
		SupervisorConfig {
			log_buffer_size: args.log_buffer_size.max(1),
			kill_timeout: Duration::from_secs(args.kill_timeout),
			..Default::default()
		},
	);

	let width = sup.names().iter().map(|n| n.len()).max().unwrap_or(0);
	for (i, name) in sup.names().iter().enumerate() {
		if let Some(output) = sup.output(name).await {
			tokio::spawn(follow_output(name.clone(), PALETTE[i % PALETTE.len()], width, output));
		}
	}

	sup.start().await;
	tokio::spawn(read_commands(Arc::clone(&sup)));

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			eprintln!();
			eprintln!("{}", "stopping...".dimmed());
		}
		_ = wait_until_settled(&sup) => {}
	}

	sup.shutdown().await;
	// let the followers print what the shutdown hook wrote
	tokio::time::sleep(Duration::from_millis(100)).await;

	let statuses = sup.status().await;
	print_summary(&statuses, width);
	let failed = statuses
		.iter()
		.any(|s| s.kind == ProcessKind::Process && s.state == ProcessState::Error);
	std::process::exit(if failed { 1 } else { 0 });
}

async fn follow_output(name: String, color: AnsiColors, width: usize, output: OutputCapture) {
	let label = format!("{:<width$}", name, width = width);
	let mut rx = output.subscribe();
	loop {
		match rx.recv().await {
			Ok(line) => println!("{} {} {}", label.color(color), "|".dimmed(), line),
			Err(RecvError::Lagged(n)) => {
				println!("{} {} {}", label.color(color), "|".dimmed(), format!("... {} lines skipped", n).dimmed());
			}
			Err(RecvError::Closed) => break,
		}
	}
}

/// Resolves once no regular process is alive or waiting to start.
async fn wait_until_settled(sup: &Supervisor) {
	loop {
		tokio::time::sleep(Duration::from_millis(500)).await;
		let statuses = sup.status().await;
		let settled = statuses
			.iter()
			.filter(|s| s.kind == ProcessKind::Process)
			.all(|s| s.state.is_terminal());
		if settled {
			return;
		}
	}
}

/// Line commands on stdin: `restart <name>`, `kill <name>`, `status`.
async fn read_commands(sup: Arc<Supervisor>) {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		let mut parts = line.split_whitespace();
		let result = match (parts.next(), parts.next()) {
			(Some("restart" | "r"), Some(name)) => sup.restart_process(name).await,
			(Some("kill" | "k"), Some(name)) => sup.kill_process(name).await,
			(Some("status" | "st"), None) => {
				let width = sup.names().iter().map(|n| n.len()).max().unwrap_or(0);
				print_summary(&sup.status().await, width);
				continue;
			}
			(None, _) => continue,
			_ => Err("usage: restart <name> | kill <name> | status".to_string()),
		};
		match result {
			Ok(msg) => eprintln!("{}", msg.dimmed()),
			Err(msg) => eprintln!("{} {}", "error:".red().bold(), msg),
		}
	}
}

fn print_summary(statuses: &[ProcessStatus], width: usize) {
	for status in statuses {
		let state = status.state.to_string();
		let state = match status.state {
			ProcessState::Running | ProcessState::Success => state.green().to_string(),
			ProcessState::Error => state.red().to_string(),
			ProcessState::Killed | ProcessState::Killing => state.yellow().to_string(),
			ProcessState::Pending | ProcessState::Starting => state.dimmed().to_string(),
		};

		let mut detail = String::new();
		if let Some(code) = status.exit_code {
			detail.push_str(&format!(" exit {}", code));
		}
		if let Some(pid) = status.pid {
			detail.push_str(&format!(" pid {}", pid));
		}
		if let Some(profile) = status.profile {
			detail.push_str(&format!(" {}MB {:.1}%", profile.memory_mb, profile.cpu_percent));
		}

		eprintln!(" {:<width$} {}{}", status.name, state, detail.dimmed(), width = width);
	}
}
