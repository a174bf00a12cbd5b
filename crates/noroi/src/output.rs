use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::log_buffer::LogBuffer;
use crate::search::SearchHit;

/// Shared handle to one process's log buffer.
///
/// Cloning is cheap; every clone reads and writes the same buffer. New lines are
/// also fanned out to subscribers so a front-end can follow output live.
#[derive(Clone)]
pub struct OutputCapture {
	buffer: Arc<Mutex<LogBuffer>>,
	sender: broadcast::Sender<String>,
}

impl OutputCapture {
	pub fn new(max_lines: usize) -> Self {
		let (sender, _) = broadcast::channel(1024);
		Self {
			buffer: Arc::new(Mutex::new(LogBuffer::new(max_lines))),
			sender,
		}
	}

	pub async fn write_line(&self, line: impl Into<String>) {
		let line = line.into();
		{
			let mut buffer = self.buffer.lock().await;
			buffer.add(line.clone());
		}
		let _ = self.sender.send(line);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<String> {
		self.sender.subscribe()
	}

	pub async fn clear(&self) {
		self.buffer.lock().await.clear();
	}

	pub async fn recent_lines(&self, count: usize) -> Vec<String> {
		self.buffer.lock().await.get_recent_lines(count)
	}

	pub async fn lines_at(&self, start: u64, count: usize) -> Vec<String> {
		self.buffer.lock().await.get_lines_by_absolute_position(start, count)
	}

	pub async fn search(&self, query: &str) -> Vec<SearchHit> {
		self.buffer.lock().await.search(query)
	}

	/// Runs `f` against the buffer while holding its lock.
	pub async fn with_buffer<R>(&self, f: impl FnOnce(&LogBuffer) -> R) -> R {
		let buffer = self.buffer.lock().await;
		f(&buffer)
	}
}

/// Turns a stream of byte chunks into lines.
///
/// A partial line at the end of a chunk is held until the rest arrives or
/// [`LineSplitter::finish`] is called. Carriage returns are stripped and
/// whitespace-only lines are dropped.
#[derive(Default)]
pub struct LineSplitter {
	pending: Vec<u8>,
}

impl LineSplitter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
		let mut lines = Vec::new();
		let mut rest = chunk;
		while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
			self.pending.extend_from_slice(&rest[..pos]);
			if let Some(line) = take_line(&mut self.pending) {
				lines.push(line);
			}
			rest = &rest[pos + 1..];
		}
		self.pending.extend_from_slice(rest);
		lines
	}

	pub fn finish(&mut self) -> Option<String> {
		take_line(&mut self.pending)
	}
}

fn take_line(bytes: &mut Vec<u8>) -> Option<String> {
	let line = String::from_utf8_lossy(bytes).replace('\r', "");
	bytes.clear();
	if line.trim().is_empty() {
		None
	} else {
		Some(line)
	}
}
