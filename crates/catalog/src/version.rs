use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural fingerprint of an entity, used to find an already persisted equivalent
/// entity instead of inserting a duplicate row.
///
/// Two entities with different versions are never equivalent. Two entities with the same
/// version are *probably* equivalent, and must still be compared field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityVersion(u64);

impl EntityVersion {
	#[must_use]
	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	#[must_use]
	pub const fn value(self) -> u64 {
		self.0
	}
}

impl From<u64> for EntityVersion {
	fn from(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for EntityVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

/// Canonical encoder feeding an entity's semantic fields into blake3.
///
/// Every variable length value is prefixed by its length and every optional value by a
/// presence tag, so distinct field sequences never produce the same byte stream.
pub(crate) struct VersionHasher(blake3::Hasher);

impl VersionHasher {
	pub fn new(domain: &str) -> Self {
		let mut hasher = Self(blake3::Hasher::new());
		hasher.str(domain);
		hasher
	}

	pub fn str(&mut self, value: &str) -> &mut Self {
		self.len(value.len());
		self.0.update(value.as_bytes());
		self
	}

	pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
		match value {
			Some(value) => {
				self.0.update(&[1]);
				self.str(value)
			}
			None => {
				self.0.update(&[0]);
				self
			}
		}
	}

	pub fn opt_i64(&mut self, value: Option<i64>) -> &mut Self {
		match value {
			Some(value) => {
				self.0.update(&[1]);
				self.0.update(&value.to_le_bytes());
			}
			None => {
				self.0.update(&[0]);
			}
		}
		self
	}

	pub fn bool(&mut self, value: bool) -> &mut Self {
		self.0.update(&[u8::from(value)]);
		self
	}

	pub fn version(&mut self, value: EntityVersion) -> &mut Self {
		self.0.update(&value.0.to_le_bytes());
		self
	}

	/// Hashes a sequence, which callers must provide in a deterministic order.
	pub fn seq<T>(
		&mut self,
		items: impl ExactSizeIterator<Item = T>,
		mut each: impl FnMut(&mut Self, T),
	) -> &mut Self {
		self.len(items.len());
		for item in items {
			each(self, item);
		}
		self
	}

	fn len(&mut self, len: usize) {
		self.0.update(&(len as u64).to_le_bytes());
	}

	pub fn finish(&self) -> EntityVersion {
		let hash = self.0.finalize();
		let mut bytes = [0; 8];
		bytes.copy_from_slice(&hash.as_bytes()[..8]);
		EntityVersion(u64::from_le_bytes(bytes))
	}
}
