use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::types::{http_url, ReadinessProbe};

/// Runs a readiness probe once. Every failure, including a timeout, is `false`.
pub async fn run_probe(probe: &ReadinessProbe, timeout: Duration) -> bool {
	match probe {
		ReadinessProbe::Http { host, port, path } => {
			let url = http_url(host, *port, path);
			check_http(&url, timeout).await
		}
		ReadinessProbe::Exec { command } => check_exec(command, timeout).await,
	}
}

async fn check_http(url: &str, timeout: Duration) -> bool {
	let client = match reqwest::Client::builder().timeout(timeout).no_proxy().build() {
		Ok(c) => c,
		Err(e) => {
			tracing::debug!("probe {}: client error: {}", url, e);
			return false;
		}
	};
	match client.get(url).send().await {
		Ok(resp) => {
			let ok = resp.status().is_success();
			tracing::debug!("probe {}: {}", url, resp.status());
			ok
		}
		Err(e) => {
			tracing::debug!("probe {}: {}", url, e);
			false
		}
	}
}

async fn check_exec(command: &str, timeout: Duration) -> bool {
	let child = Command::new("sh")
		.args(["-c", command])
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.kill_on_drop(true)
		.spawn();
	let mut child = match child {
		Ok(c) => c,
		Err(e) => {
			tracing::debug!("probe `{}`: spawn failed: {}", command, e);
			return false;
		}
	};

	match tokio::time::timeout(timeout, child.wait()).await {
		Ok(Ok(status)) => status.success(),
		Ok(Err(e)) => {
			tracing::debug!("probe `{}`: {}", command, e);
			false
		}
		Err(_) => {
			tracing::debug!("probe `{}`: timed out after {:?}", command, timeout);
			false
		}
	}
}
