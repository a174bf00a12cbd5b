use crate::deque::Deque;
use crate::search::{SearchHit, SearchIndex};

pub const DEFAULT_LOG_BUFFER_SIZE: usize = 5_000;

/// Bounded line store with absolute line addressing and a search index.
///
/// Every line ever added gets an absolute number (`0, 1, 2, ..`) that is never
/// reused until [`LogBuffer::clear`]. Once more than `max_size` lines have been
/// added the oldest are evicted, and numbers below
/// [`LogBuffer::get_oldest_available_line_number`] are gone for good.
pub struct LogBuffer {
	lines: Deque<String>,
	max_size: usize,
	total_lines_added: u64,
	index: SearchIndex,
	next_id: u64,
	// ids in insertion order, so eviction knows which document to discard
	discard_queue: Deque<u64>,
}

impl LogBuffer {
	pub fn new(max_size: usize) -> Self {
		let max_size = max_size.max(1);
		Self {
			lines: Deque::with_capacity(max_size.min(1024)),
			max_size,
			total_lines_added: 0,
			index: SearchIndex::new(),
			next_id: 0,
			discard_queue: Deque::with_capacity(max_size.min(1024)),
		}
	}

	pub fn max_size(&self) -> usize {
		self.max_size
	}

	pub fn add(&mut self, line: impl Into<String>) {
		let line = line.into();
		let line_number = self.total_lines_added;
		let id = self.next_id;
		self.next_id += 1;
		self.total_lines_added += 1;

		self.index.add(id, &line, line_number);
		self.discard_queue.push(id);
		self.lines.push(line);

		if self.lines.len() > self.max_size {
			self.lines.shift();
			if let Some(oldest) = self.discard_queue.shift() {
				self.index.discard(oldest);
			}
		}
	}

	/// The last `count` lines, oldest first.
	pub fn get_recent_lines(&self, count: usize) -> Vec<String> {
		self.lines
			.peek_back_in_order(count)
			.into_iter()
			.cloned()
			.collect()
	}

	/// Retained lines covering `[start, start + count)`, clipped to what is
	/// still in the buffer.
	pub fn get_lines_by_absolute_position(&self, start: u64, count: usize) -> Vec<String> {
		if count == 0 || self.lines.is_empty() {
			return Vec::new();
		}

		let oldest = self.get_oldest_available_line_number();
		let newest = self.total_lines_added - 1;
		let end = start.saturating_add(count as u64);
		if start > newest || end <= oldest {
			return Vec::new();
		}

		let first = start.max(oldest);
		let last = end.min(self.total_lines_added);
		(first..last)
			.filter_map(|n| self.lines.get((n - oldest) as isize).cloned())
			.collect()
	}

	pub fn get_oldest_available_line_number(&self) -> u64 {
		self.total_lines_added - self.lines.len() as u64
	}

	pub fn is_position_valid(&self, position: u64) -> bool {
		position >= self.get_oldest_available_line_number() && position < self.total_lines_added
	}

	/// Number of lines currently retained.
	pub fn get_total_lines(&self) -> usize {
		self.lines.len()
	}

	pub fn total_lines_added(&self) -> u64 {
		self.total_lines_added
	}

	pub fn clear(&mut self) {
		self.lines.clear();
		self.index.remove_all();
		self.discard_queue.clear();
		self.next_id = 0;
		self.total_lines_added = 0;
	}

	pub fn search(&self, query: &str) -> Vec<SearchHit> {
		let query = query.trim();
		if query.is_empty() {
			return Vec::new();
		}
		self.index.search(query)
	}
}

impl Default for LogBuffer {
	fn default() -> Self {
		Self::new(DEFAULT_LOG_BUFFER_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filled(max: usize, n: usize) -> LogBuffer {
		let mut buf = LogBuffer::new(max);
		for i in 0..n {
			buf.add(format!("line {} entry{}", i, i));
		}
		buf
	}

	#[test]
	fn eviction_keeps_window_and_counters() {
		let buf = filled(10, 25);
		assert_eq!(buf.get_total_lines(), 10);
		assert_eq!(buf.total_lines_added(), 25);
		assert_eq!(buf.get_oldest_available_line_number(), 15);
		assert_eq!(buf.get_recent_lines(1), vec!["line 24 entry24"]);
	}

	#[test]
	fn search_never_returns_evicted_lines() {
		let buf = filled(10, 25);
		let hits = buf.search("line");
		assert_eq!(hits.len(), 10);
		assert!(hits.iter().all(|h| h.line_number >= 15));
		assert!(buf.search("entry3").is_empty());
		let hits = buf.search("entry2");
		let mut numbers: Vec<u64> = hits.iter().map(|h| h.line_number).collect();
		numbers.sort();
		assert_eq!(numbers, vec![20, 21, 22, 23, 24]);
	}

	#[test]
	fn recent_lines_are_chronological() {
		let buf = filled(100, 5);
		assert_eq!(
			buf.get_recent_lines(3),
			vec!["line 2 entry2", "line 3 entry3", "line 4 entry4"]
		);
		assert_eq!(buf.get_recent_lines(50).len(), 5);
		assert!(buf.get_recent_lines(0).is_empty());
	}

	#[test]
	fn absolute_range_matches_recent_lines() {
		let buf = filled(8, 30);
		let oldest = buf.get_oldest_available_line_number();
		let total = buf.get_total_lines();
		assert_eq!(
			buf.get_lines_by_absolute_position(oldest, total),
			buf.get_recent_lines(total)
		);
	}

	#[test]
	fn absolute_range_is_clipped() {
		let buf = filled(8, 30);
		// retained: 22..30
		assert_eq!(
			buf.get_lines_by_absolute_position(20, 4),
			vec!["line 22 entry22", "line 23 entry23"]
		);
		assert_eq!(buf.get_lines_by_absolute_position(28, 10).len(), 2);
		assert!(buf.get_lines_by_absolute_position(0, 22).is_empty());
		assert!(buf.get_lines_by_absolute_position(30, 5).is_empty());
		assert!(buf.get_lines_by_absolute_position(25, 0).is_empty());
		assert_eq!(buf.get_lines_by_absolute_position(u64::MAX - 1, usize::MAX).len(), 0);
	}

	#[test]
	fn position_validity() {
		let buf = filled(5, 12);
		assert!(!buf.is_position_valid(6));
		assert!(buf.is_position_valid(7));
		assert!(buf.is_position_valid(11));
		assert!(!buf.is_position_valid(12));
	}

	#[test]
	fn clear_resets_everything() {
		let mut buf = filled(5, 12);
		buf.clear();
		assert_eq!(buf.get_total_lines(), 0);
		assert_eq!(buf.total_lines_added(), 0);
		assert_eq!(buf.get_oldest_available_line_number(), 0);
		assert!(!buf.is_position_valid(7));
		assert!(!buf.is_position_valid(0));
		assert!(buf.search("line").is_empty());

		buf.add("fresh start");
		assert_eq!(buf.search("fresh")[0].line_number, 0);
	}

	#[test]
	fn blank_search_is_empty() {
		let buf = filled(5, 5);
		assert!(buf.search("   ").is_empty());
		assert!(buf.search("").is_empty());
	}
}
