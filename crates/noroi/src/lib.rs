//! # noroi
//!
//! Dependency-aware process runner for local development stacks.
//!
//! Declares a set of shell commands, starts each one once the processes it
//! depends on are started, ready or finished, probes readiness over HTTP or with
//! a command, samples memory and CPU, and keeps a bounded, searchable log of
//! every process's output.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use noroi::{Condition, ProcessSet, ProcessSpec, ReadinessProbe, Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let set = ProcessSet {
//!     process: vec![
//!         ProcessSpec::new("db", "postgres -D ./data").with_probe(ReadinessProbe::Exec {
//!             command: "pg_isready".into(),
//!         }),
//!         ProcessSpec::new("web", "npm run dev").depends_on("db", Condition::Ready),
//!     ],
//!     ..Default::default()
//! };
//!
//! let sup = Supervisor::new(set, SupervisorConfig::default());
//! sup.start().await;
//!
//! tokio::signal::ctrl_c().await.ok();
//! sup.shutdown().await;
//! # }
//! ```

pub mod deps;
pub mod deque;
pub mod log_buffer;
pub mod output;
pub mod probe;
pub mod profile;
pub mod record;
pub mod search;
pub mod supervisor;
pub mod types;

pub use deps::are_dependencies_satisfied;
pub use deque::Deque;
pub use log_buffer::LogBuffer;
pub use output::OutputCapture;
pub use profile::{PsSampler, ResourceSampler, ResourceUsage};
pub use record::{ProcessHandle, ProcessRecord};
pub use search::SearchHit;
pub use supervisor::{Supervisor, SupervisorConfig};
pub use types::*;
