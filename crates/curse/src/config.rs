use noroi::{ProcessSet, ProcessSpec};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "curse.toml";
pub const LOCAL_CONFIG_FILE: &str = "curse.local.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no config file found, looking for curse.toml or curse.local.toml")]
	NotFound,
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("config has no processes")]
	NoProcesses,
	#[error("duplicate process name '{0}'")]
	DuplicateName(String),
	#[error("'{0}' has an empty command")]
	EmptyCommand(String),
	#[error("'{name}' depends on unknown process '{dependency}'")]
	UnknownDependency { name: String, dependency: String },
	#[error("'{0}' depends on itself")]
	SelfDependency(String),
	#[error("dependency cycle: {}", .0.join(" -> "))]
	DependencyCycle(Vec<String>),
}

// ── Discovery ────────────────────────────────────────────────────────────────

/// Picks the config file: an explicit path (relative to `cwd`), else
/// `curse.toml`, else `curse.local.toml`.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, ConfigError> {
	if let Some(path) = explicit {
		return Ok(cwd.join(path));
	}
	[CONFIG_FILE, LOCAL_CONFIG_FILE]
		.iter()
		.map(|name| cwd.join(name))
		.find(|path| path.is_file())
		.ok_or(ConfigError::NotFound)
}

pub fn load_config(path: &Path) -> Result<ProcessSet, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<ProcessSet, ConfigError> {
	let set: ProcessSet = toml::from_str(content)?;
	validate(&set)?;
	Ok(set)
}

// ── Validation ───────────────────────────────────────────────────────────────

pub fn validate(set: &ProcessSet) -> Result<(), ConfigError> {
	if set.process.is_empty() {
		return Err(ConfigError::NoProcesses);
	}

	let hooks = set.hooks.startup.iter().chain(set.hooks.shutdown.iter());
	let mut seen = HashSet::new();
	for (name, command) in set
		.process
		.iter()
		.map(|p| (&p.name, &p.command))
		.chain(hooks.map(|h| (&h.name, &h.command)))
	{
		if !seen.insert(name.as_str()) {
			return Err(ConfigError::DuplicateName(name.clone()));
		}
		if command.trim().is_empty() {
			return Err(ConfigError::EmptyCommand(name.clone()));
		}
	}

	let processes: HashMap<&str, &ProcessSpec> =
		set.process.iter().map(|p| (p.name.as_str(), p)).collect();
	for spec in &set.process {
		for dep in &spec.deps {
			if dep.name == spec.name {
				return Err(ConfigError::SelfDependency(spec.name.clone()));
			}
			if !processes.contains_key(dep.name.as_str()) {
				return Err(ConfigError::UnknownDependency {
					name: spec.name.clone(),
					dependency: dep.name.clone(),
				});
			}
		}
	}

	if let Some(cycle) = find_cycle(&set.process, &processes) {
		return Err(ConfigError::DependencyCycle(cycle));
	}
	Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
	Unvisited,
	InProgress,
	Done,
}

/// Depth-first search over the dependency graph. Returns the names along the
/// first cycle found, closing back on its first element.
fn find_cycle(specs: &[ProcessSpec], by_name: &HashMap<&str, &ProcessSpec>) -> Option<Vec<String>> {
	fn visit<'a>(
		name: &'a str,
		by_name: &HashMap<&str, &'a ProcessSpec>,
		marks: &mut HashMap<&'a str, Mark>,
		path: &mut Vec<&'a str>,
	) -> Option<Vec<String>> {
		match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
			Mark::Done => return None,
			Mark::InProgress => {
				let start = path.iter().position(|n| *n == name).unwrap_or(0);
				let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
				cycle.push(name.to_string());
				return Some(cycle);
			}
			Mark::Unvisited => {}
		}

		marks.insert(name, Mark::InProgress);
		path.push(name);
		if let Some(&spec) = by_name.get(name) {
			for dep in &spec.deps {
				if let Some(cycle) = visit(dep.name.as_str(), by_name, marks, path) {
					return Some(cycle);
				}
			}
		}
		path.pop();
		marks.insert(name, Mark::Done);
		None
	}

	let mut marks = HashMap::new();
	let mut path = Vec::new();
	specs
		.iter()
		.find_map(|spec| visit(spec.name.as_str(), by_name, &mut marks, &mut path))
}
