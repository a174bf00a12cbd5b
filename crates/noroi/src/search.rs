//! Inverted index over log lines with prefix matching and BM25 scoring.
//!
//! Each document remembers its own distinct terms, so [`SearchIndex::discard`]
//! only touches the postings of that one line.

use std::collections::{BTreeMap, HashMap};

const K1: f64 = 1.2;
const B: f64 = 0.7;
const PREFIX_WEIGHT: f64 = 0.375;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
	pub text: String,
	pub line_number: u64,
	pub score: f64,
}

struct Document {
	text: String,
	line_number: u64,
	terms: Vec<String>,
	len: usize,
}

#[derive(Default)]
pub struct SearchIndex {
	postings: BTreeMap<String, HashMap<u64, u32>>,
	docs: HashMap<u64, Document>,
	total_terms: usize,
}

pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|t| !t.is_empty())
		.map(|t| t.to_lowercase())
}

impl SearchIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.docs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.docs.is_empty()
	}

	pub fn add(&mut self, id: u64, text: &str, line_number: u64) {
		if self.docs.contains_key(&id) {
			self.discard(id);
		}

		let mut freqs: HashMap<String, u32> = HashMap::new();
		let mut len = 0;
		for term in tokenize(text) {
			*freqs.entry(term).or_default() += 1;
			len += 1;
		}

		let mut terms = Vec::with_capacity(freqs.len());
		for (term, tf) in freqs {
			self.postings.entry(term.clone()).or_default().insert(id, tf);
			terms.push(term);
		}

		self.total_terms += len;
		self.docs.insert(
			id,
			Document {
				text: text.to_string(),
				line_number,
				terms,
				len,
			},
		);
	}

	pub fn discard(&mut self, id: u64) {
		let Some(doc) = self.docs.remove(&id) else {
			return;
		};
		for term in &doc.terms {
			if let Some(docs) = self.postings.get_mut(term) {
				docs.remove(&id);
				if docs.is_empty() {
					self.postings.remove(term);
				}
			}
		}
		self.total_terms -= doc.len;
	}

	pub fn remove_all(&mut self) {
		self.postings.clear();
		self.docs.clear();
		self.total_terms = 0;
	}

	/// Documents matching any query token as a term prefix, best first.
	pub fn search(&self, query: &str) -> Vec<SearchHit> {
		if self.docs.is_empty() {
			return Vec::new();
		}

		let n = self.docs.len() as f64;
		let avg_len = (self.total_terms as f64 / n).max(1.0);
		let mut scores: HashMap<u64, f64> = HashMap::new();

		for token in tokenize(query) {
			let matches = self
				.postings
				.range(token.clone()..)
				.take_while(|(term, _)| term.starts_with(token.as_str()));

			for (term, docs) in matches {
				let weight = if *term == token { 1.0 } else { PREFIX_WEIGHT };
				let df = docs.len() as f64;
				let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

				for (id, tf) in docs {
					let Some(doc) = self.docs.get(id) else {
						continue;
					};
					let tf = *tf as f64;
					let norm = 1.0 - B + B * doc.len as f64 / avg_len;
					let score = weight * idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
					*scores.entry(*id).or_default() += score;
				}
			}
		}

		let mut hits: Vec<SearchHit> = scores
			.into_iter()
			.filter_map(|(id, score)| {
				self.docs.get(&id).map(|doc| SearchHit {
					text: doc.text.clone(),
					line_number: doc.line_number,
					score,
				})
			})
			.collect();

		hits.sort_by(|a, b| {
			b.score
				.total_cmp(&a.score)
				.then(a.line_number.cmp(&b.line_number))
		});
		hits
	}
}
