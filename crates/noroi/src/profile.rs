use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
	pub memory_mb: u64,
	pub cpu_percent: f64,
}

pub type SampleFuture<'a> = Pin<Box<dyn Future<Output = Option<ResourceUsage>> + Send + 'a>>;

/// Source of memory/CPU samples for a pid. `None` means the sample could not be
/// taken; the supervisor keeps the previous profile in that case.
pub trait ResourceSampler: Send + Sync {
	fn sample(&self, pid: u32) -> SampleFuture<'_>;
}

/// Samples through `ps -o rss,pcpu -p <pid>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsSampler;

impl ResourceSampler for PsSampler {
	fn sample(&self, pid: u32) -> SampleFuture<'_> {
		Box::pin(async move {
			let output = Command::new("ps")
				.args(["-o", "rss,pcpu", "-p", &pid.to_string()])
				.stdin(Stdio::null())
				.stderr(Stdio::null())
				.output()
				.await
				.ok()?;
			parse_ps_output(&String::from_utf8_lossy(&output.stdout))
		})
	}
}

/// Parses the first data row of `ps -o rss,pcpu` output (RSS in KiB).
pub fn parse_ps_output(output: &str) -> Option<ResourceUsage> {
	let row = output.trim().lines().nth(1)?;
	let mut fields = row.split_whitespace();
	let rss_kb: u64 = fields.next()?.parse().ok()?;
	let cpu_percent: f64 = fields.next()?.parse().ok()?;
	Some(ResourceUsage {
		memory_mb: (rss_kb as f64 / 1024.0).round() as u64,
		cpu_percent,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_ps_row() {
		let out = "  RSS %CPU\n 52224  3.5\n";
		assert_eq!(
			parse_ps_output(out),
			Some(ResourceUsage { memory_mb: 51, cpu_percent: 3.5 })
		);
	}

	#[test]
	fn rejects_missing_or_garbled_rows() {
		assert_eq!(parse_ps_output("  RSS %CPU\n"), None);
		assert_eq!(parse_ps_output(""), None);
		assert_eq!(parse_ps_output("RSS %CPU\nabc 1.0"), None);
		assert_eq!(parse_ps_output("RSS %CPU\n1024"), None);
	}

	#[tokio::test]
	async fn samples_own_process() {
		let usage = PsSampler.sample(std::process::id()).await;
		if let Some(usage) = usage {
			assert!(usage.cpu_percent >= 0.0);
		}
	}
}
