//! Growable ring buffer with O(1) amortized insertion and removal at both ends.
//!
//! Capacity is always a power of two so a logical index maps to its slot with a
//! mask: `(front + i) & (capacity - 1)`. When the buffer grows while its window
//! wraps past the end of the backing store, only the wrapped head segment is
//! moved into the new space.

use std::fmt;

pub const MIN_CAPACITY: usize = 16;
pub const MAX_CAPACITY: usize = 1 << 30;

pub struct Deque<T> {
	slots: Vec<Option<T>>,
	front: usize,
	len: usize,
}

/// Smallest power of two >= `n`, clamped to `[MIN_CAPACITY, MAX_CAPACITY]`.
pub fn capacity_for(n: usize) -> usize {
	n.clamp(MIN_CAPACITY, MAX_CAPACITY).next_power_of_two()
}

impl<T> Deque<T> {
	pub fn new() -> Self {
		Self::with_capacity(MIN_CAPACITY)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity_for(capacity);
		let mut slots = Vec::with_capacity(capacity);
		slots.resize_with(capacity, || None);
		Self { slots, front: 0, len: 0 }
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn capacity(&self) -> usize {
		self.slots.len()
	}

	#[inline]
	fn mask(&self) -> usize {
		self.slots.len() - 1
	}

	#[inline]
	fn slot(&self, logical: usize) -> usize {
		(self.front + logical) & self.mask()
	}

	/// Appends to the back. Returns the new length.
	pub fn push(&mut self, item: T) -> usize {
		self.check_capacity(self.len + 1);
		let i = self.slot(self.len);
		self.slots[i] = Some(item);
		self.len += 1;
		self.len
	}

	pub fn push_all<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
		for item in items {
			self.push(item);
		}
		self.len
	}

	/// Prepends to the front. Returns the new length.
	pub fn unshift(&mut self, item: T) -> usize {
		self.check_capacity(self.len + 1);
		let i = (self.front + self.capacity() - 1) & self.mask();
		self.slots[i] = Some(item);
		self.front = i;
		self.len += 1;
		self.len
	}

	/// Prepends `items` so that they end up at the front in the order given.
	pub fn unshift_all<I>(&mut self, items: I) -> usize
	where
		I: IntoIterator<Item = T>,
		I::IntoIter: DoubleEndedIterator,
	{
		for item in items.into_iter().rev() {
			self.unshift(item);
		}
		self.len
	}

	pub fn pop(&mut self) -> Option<T> {
		if self.len == 0 {
			return None;
		}
		let i = self.slot(self.len - 1);
		self.len -= 1;
		self.slots[i].take()
	}

	pub fn shift(&mut self) -> Option<T> {
		if self.len == 0 {
			return None;
		}
		let i = self.front;
		self.front = (self.front + 1) & self.mask();
		self.len -= 1;
		self.slots[i].take()
	}

	/// Element at logical index `index`; negative values count from the back
	/// (`-1` is the last element). Out-of-range indices yield `None`.
	pub fn get(&self, index: isize) -> Option<&T> {
		let len = self.len as isize;
		let i = if index < 0 { index + len } else { index };
		if i < 0 || i >= len {
			return None;
		}
		self.slots[self.slot(i as usize)].as_ref()
	}

	/// Like [`Deque::get`] for callers holding a floating-point index.
	/// NaN, infinities and fractional values yield `None`.
	pub fn get_f64(&self, index: f64) -> Option<&T> {
		if !index.is_finite() || index.fract() != 0.0 {
			return None;
		}
		if index.abs() > isize::MAX as f64 {
			return None;
		}
		self.get(index as isize)
	}

	/// Up to `count` elements from the front, front-to-back.
	pub fn peek_front(&self, count: usize) -> Vec<&T> {
		let n = count.min(self.len);
		(0..n).filter_map(|i| self.slots[self.slot(i)].as_ref()).collect()
	}

	/// Up to `count` elements from the back, back-to-front.
	pub fn peek_back(&self, count: usize) -> Vec<&T> {
		let n = count.min(self.len);
		(0..n)
			.filter_map(|i| self.slots[self.slot(self.len - 1 - i)].as_ref())
			.collect()
	}

	/// The last `count` elements in front-to-back order, without a reversal pass.
	pub fn peek_back_in_order(&self, count: usize) -> Vec<&T> {
		let n = count.min(self.len);
		let start = self.len - n;
		(0..n)
			.filter_map(|i| self.slots[self.slot(start + i)].as_ref())
			.collect()
	}

	pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
		(0..self.len).filter_map(move |i| self.slots[self.slot(i)].as_ref())
	}

	pub fn clear(&mut self) {
		for i in 0..self.len {
			let slot = self.slot(i);
			self.slots[slot] = None;
		}
		self.front = 0;
		self.len = 0;
	}

	fn check_capacity(&mut self, size: usize) {
		if self.capacity() < size {
			let grown = self.capacity() + self.capacity() / 2 + 16;
			self.resize_to(capacity_for(grown.max(size)));
		}
	}

	fn resize_to(&mut self, capacity: usize) {
		let old_capacity = self.capacity();
		if capacity <= old_capacity {
			panic!("deque capacity overflow");
		}
		self.slots.resize_with(capacity, || None);
		if self.front + self.len > old_capacity {
			let wrapped = (self.front + self.len) & (old_capacity - 1);
			for j in 0..wrapped {
				self.slots[old_capacity + j] = self.slots[j].take();
			}
		}
	}
}

impl<T: Clone> Deque<T> {
	pub fn to_vec(&self) -> Vec<T> {
		self.iter().cloned().collect()
	}
}

impl<T> Default for Deque<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> From<Vec<T>> for Deque<T> {
	fn from(items: Vec<T>) -> Self {
		let mut deque = Self::with_capacity(items.len());
		deque.push_all(items);
		deque
	}
}

impl<T> FromIterator<T> for Deque<T> {
	fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
		Self::from(iter.into_iter().collect::<Vec<_>>())
	}
}

impl<T: fmt::Debug> fmt::Debug for Deque<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.iter()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::VecDeque;

	#[test]
	fn capacity_is_clamped_power_of_two() {
		assert_eq!(capacity_for(0), 16);
		assert_eq!(capacity_for(16), 16);
		assert_eq!(capacity_for(17), 32);
		assert_eq!(capacity_for(1000), 1024);
		assert_eq!(capacity_for(usize::MAX), MAX_CAPACITY);
	}

	#[test]
	fn from_vec_sizes_to_length() {
		let d: Deque<u32> = (0..40).collect::<Vec<_>>().into();
		assert_eq!(d.capacity(), 64);
		assert_eq!(d.len(), 40);
		assert_eq!(d.to_vec(), (0..40).collect::<Vec<_>>());
	}

	#[test]
	fn empty_sentinels() {
		let mut d: Deque<i32> = Deque::new();
		assert_eq!(d.pop(), None);
		assert_eq!(d.shift(), None);
		assert_eq!(d.get(0), None);
		assert_eq!(d.get(-1), None);
		assert!(d.peek_back(3).is_empty());
		assert!(d.peek_front(0).is_empty());
	}

	#[test]
	fn push_and_unshift_order() {
		let mut d = Deque::new();
		d.push(2);
		d.push(3);
		d.unshift(1);
		d.unshift_all(vec![-1, 0]);
		d.push_all(vec![4, 5]);
		assert_eq!(d.to_vec(), vec![-1, 0, 1, 2, 3, 4, 5]);
		assert_eq!(d.shift(), Some(-1));
		assert_eq!(d.pop(), Some(5));
		assert_eq!(d.len(), 5);
	}

	#[test]
	fn get_handles_negative_and_out_of_range() {
		let d: Deque<char> = "abcde".chars().collect();
		assert_eq!(d.get(0), Some(&'a'));
		assert_eq!(d.get(-1), Some(&'e'));
		assert_eq!(d.get(-5), Some(&'a'));
		assert_eq!(d.get(-6), None);
		assert_eq!(d.get(5), None);
		assert_eq!(d.get(isize::MIN), None);
		assert_eq!(d.get(-1), Some(d.peek_back(1)[0]));
	}

	#[test]
	fn get_f64_rejects_non_integers() {
		let d: Deque<u8> = vec![1, 2, 3].into();
		assert_eq!(d.get_f64(1.0), Some(&2));
		assert_eq!(d.get_f64(-1.0), Some(&3));
		assert_eq!(d.get_f64(0.5), None);
		assert_eq!(d.get_f64(f64::NAN), None);
		assert_eq!(d.get_f64(f64::INFINITY), None);
		assert_eq!(d.get_f64(f64::NEG_INFINITY), None);
		assert_eq!(d.get_f64(1e300), None);
	}

	#[test]
	fn peeks() {
		let d: Deque<u32> = (1..=6).collect();
		assert_eq!(d.peek_front(3), vec![&1, &2, &3]);
		assert_eq!(d.peek_back(3), vec![&6, &5, &4]);
		assert_eq!(d.peek_back_in_order(3), vec![&4, &5, &6]);
		assert_eq!(d.peek_back_in_order(100).len(), 6);
		assert_eq!(d.len(), 6);
	}

	#[test]
	fn grow_relocates_wrapped_segment() {
		let mut d = Deque::new();
		for i in 0..12 {
			d.push(i);
		}
		for _ in 0..10 {
			d.shift();
		}
		// window now starts near the end of the store and will wrap
		for i in 12..40 {
			d.push(i);
		}
		assert_eq!(d.to_vec(), (10..40).collect::<Vec<_>>());
		assert!(d.capacity().is_power_of_two());
		assert!(d.capacity() >= d.len());
	}

	#[test]
	fn grow_from_front_keeps_elements() {
		let mut d = Deque::new();
		for i in 0..100 {
			d.unshift(i);
		}
		assert_eq!(d.to_vec(), (0..100).rev().collect::<Vec<_>>());
		assert_eq!(d.capacity(), 128);
	}

	#[test]
	fn vacated_slots_are_released() {
		use std::rc::Rc;
		let item = Rc::new(());
		let mut d = Deque::new();
		d.push(Rc::clone(&item));
		d.push(Rc::clone(&item));
		assert_eq!(Rc::strong_count(&item), 3);
		d.pop();
		d.shift();
		assert_eq!(Rc::strong_count(&item), 1);
		d.push(Rc::clone(&item));
		d.clear();
		assert_eq!(Rc::strong_count(&item), 1);
		assert!(d.is_empty());
	}

	#[test]
	fn matches_reference_deque() {
		// deterministic xorshift so the op sequence is reproducible
		let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
		let mut next = move || {
			seed ^= seed << 13;
			seed ^= seed >> 7;
			seed ^= seed << 17;
			seed
		};

		let mut d = Deque::new();
		let mut reference = VecDeque::new();
		for step in 0..5_000u64 {
			match next() % 5 {
				0 | 1 => {
					d.push(step);
					reference.push_back(step);
				}
				2 => {
					d.unshift(step);
					reference.push_front(step);
				}
				3 => assert_eq!(d.pop(), reference.pop_back()),
				_ => assert_eq!(d.shift(), reference.pop_front()),
			}
			assert_eq!(d.len(), reference.len());
			assert_eq!(d.get(-1), reference.back());
			if step % 97 == 0 {
				assert_eq!(d.to_vec(), reference.iter().copied().collect::<Vec<_>>());
			}
		}
		assert_eq!(d.to_vec(), reference.into_iter().collect::<Vec<_>>());
	}
}
