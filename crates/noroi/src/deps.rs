use crate::record::ProcessRecord;
use crate::types::{Condition, ProcessState};

/// Whether every dependency of `record` currently meets its condition.
///
/// - `started`: the dependency is running, has succeeded, or reports ready.
/// - `succeeded`: the dependency exited with status 0.
/// - `ready`: the dependency's probe passed; without a probe, running or
///   succeeded counts as ready.
///
/// A dependency name with no matching record is never satisfied.
pub fn are_dependencies_satisfied(record: &ProcessRecord, all: &[ProcessRecord]) -> bool {
	record.dependencies.iter().all(|dep| {
		let Some(target) = all.iter().find(|r| r.name == dep.name) else {
			return false;
		};
		let alive = matches!(target.state, ProcessState::Running | ProcessState::Success);
		match dep.condition {
			Condition::Started => alive || target.is_ready == Some(true),
			Condition::Succeeded => target.state == ProcessState::Success,
			Condition::Ready => {
				if target.readiness_probe.is_some() {
					target.is_ready == Some(true)
				} else {
					alive
				}
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{ProcessSpec, ReadinessProbe};

	fn record(spec: ProcessSpec) -> ProcessRecord {
		ProcessRecord::from_spec(&spec, 10)
	}

	fn probed(name: &str) -> ProcessSpec {
		ProcessSpec::new(name, "true").with_probe(ReadinessProbe::Exec { command: "true".into() })
	}

	fn check(dependent: &ProcessSpec, dep: ProcessRecord) -> bool {
		let all = vec![dep, record(dependent.clone())];
		are_dependencies_satisfied(&all[1], &all)
	}

	#[test]
	fn no_dependencies_is_satisfied() {
		let r = record(ProcessSpec::new("a", "true"));
		assert!(are_dependencies_satisfied(&r, std::slice::from_ref(&r)));
	}

	#[test]
	fn unknown_dependency_is_unsatisfied() {
		let r = record(ProcessSpec::new("a", "true").depends_on("ghost", Condition::Started));
		assert!(!are_dependencies_satisfied(&r, std::slice::from_ref(&r)));
	}

	#[test]
	fn started_condition() {
		let b = ProcessSpec::new("b", "true").depends_on("a", Condition::Started);
		for (state, expected) in [
			(ProcessState::Pending, false),
			(ProcessState::Starting, false),
			(ProcessState::Running, true),
			(ProcessState::Success, true),
			(ProcessState::Error, false),
			(ProcessState::Killed, false),
		] {
			let mut a = record(ProcessSpec::new("a", "true"));
			a.state = state;
			assert_eq!(check(&b, a), expected, "state {}", state);
		}

		let mut a = record(probed("a"));
		a.state = ProcessState::Starting;
		a.is_ready = Some(true);
		assert!(check(&b, a));
	}

	#[test]
	fn succeeded_condition_needs_success() {
		let b = ProcessSpec::new("b", "true").depends_on("a", Condition::Succeeded);
		let mut a = record(ProcessSpec::new("a", "true"));
		a.state = ProcessState::Running;
		assert!(!check(&b, a));

		let mut a = record(ProcessSpec::new("a", "true"));
		a.state = ProcessState::Success;
		assert!(check(&b, a));
	}

	#[test]
	fn ready_condition_with_probe() {
		let b = ProcessSpec::new("b", "true").depends_on("a", Condition::Ready);
		let mut a = record(probed("a"));
		a.state = ProcessState::Running;
		a.is_ready = Some(false);
		assert!(!check(&b, a));

		let mut a = record(probed("a"));
		a.state = ProcessState::Running;
		a.is_ready = Some(true);
		assert!(check(&b, a));
	}

	#[test]
	fn ready_condition_without_probe_means_alive() {
		let b = ProcessSpec::new("b", "true").depends_on("a", Condition::Ready);
		let mut a = record(ProcessSpec::new("a", "true"));
		a.state = ProcessState::Running;
		assert!(check(&b, a));

		let mut a = record(ProcessSpec::new("a", "true"));
		a.state = ProcessState::Starting;
		assert!(!check(&b, a));
	}

	#[test]
	fn all_dependencies_must_hold() {
		let c = record(
			ProcessSpec::new("c", "true")
				.depends_on("a", Condition::Started)
				.depends_on("b", Condition::Succeeded),
		);
		let mut a = record(ProcessSpec::new("a", "true"));
		a.state = ProcessState::Running;
		let mut b = record(ProcessSpec::new("b", "true"));
		b.state = ProcessState::Running;
		let all = vec![a, b, c];
		assert!(!are_dependencies_satisfied(&all[2], &all));
	}
}
