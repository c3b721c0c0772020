use crate::{node::MappedEntity, Error};

use ec_catalog::{Content, EntityInfo, Pool, Product};

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;
use uuid::Uuid;

pub type PoolMapper = EntityMapper<Pool>;
pub type ProductMapper = EntityMapper<Product>;
pub type ContentMapper = EntityMapper<Content>;

/// Existing and imported entities of one kind, keyed by business ID.
///
/// The mapper is flagged dirty when two different existing rows claim the same business ID,
/// which means the owner mapping the rows were loaded from is inconsistent.
#[derive(Debug)]
pub struct EntityMapper<E: MappedEntity> {
	existing: HashMap<String, E>,
	imported: HashMap<String, E::Info>,
	dirty: bool,
}

impl<E: MappedEntity> Default for EntityMapper<E> {
	fn default() -> Self {
		Self {
			existing: HashMap::new(),
			imported: HashMap::new(),
			dirty: false,
		}
	}
}

impl<E: MappedEntity> EntityMapper<E> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Maps a local entity. A different row already mapped for its ID is replaced.
	///
	/// Returns whether the entity wasn't mapped yet.
	pub fn add_existing_entity(&mut self, entity: E) -> Result<bool, Error> {
		let entity_id = validated_id::<E>(entity.entity_id())?;

		match self.existing.get(entity_id) {
			Some(mapped) if mapped.uuid() == entity.uuid() => Ok(false),
			Some(mapped) => {
				warn!(
					kind = %E::KIND,
					entity_id,
					mapped_uuid = ?mapped.uuid(),
					uuid = ?entity.uuid(),
					"Entity ID mapped to more than one row;",
				);

				self.dirty = true;
				self.existing.insert(entity_id.to_string(), entity);

				Ok(true)
			}
			None => {
				self.existing.insert(entity_id.to_string(), entity);

				Ok(true)
			}
		}
	}

	/// Maps an upstream entity. A later import of the same ID replaces the earlier one.
	pub fn add_imported_entity(&mut self, entity: E::Info) -> Result<(), Error> {
		let entity_id = validated_id::<E>(entity.entity_id())?.to_string();
		self.imported.insert(entity_id, entity);

		Ok(())
	}

	pub fn existing_entity(&self, entity_id: &str) -> Option<&E> {
		self.existing.get(entity_id)
	}

	pub fn imported_entity(&self, entity_id: &str) -> Option<&E::Info> {
		self.imported.get(entity_id)
	}

	pub fn has_entity(&self, entity_id: &str) -> bool {
		self.existing.contains_key(entity_id) || self.imported.contains_key(entity_id)
	}

	/// Every mapped business ID, existing or imported, sorted.
	pub fn entity_ids(&self) -> BTreeSet<&str> {
		self.existing
			.keys()
			.chain(self.imported.keys())
			.map(String::as_str)
			.collect()
	}

	pub fn existing_entities(&self) -> impl Iterator<Item = &E> + '_ {
		self.existing.values()
	}

	/// Checks that `entities` are exactly the mapped existing entities, row for row.
	pub fn contains_only_existing_entities(&self, entities: &[E]) -> bool {
		let given = entities
			.iter()
			.map(|entity| (entity.entity_id(), entity.uuid()))
			.collect::<HashSet<(&str, Option<Uuid>)>>();

		given.len() == self.existing.len()
			&& self
				.existing
				.values()
				.all(|entity| given.contains(&(entity.entity_id(), entity.uuid())))
	}

	pub const fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn clear_existing(&mut self) {
		self.existing.clear();
		self.dirty = false;
	}

	pub fn clear_imported(&mut self) {
		self.imported.clear();
	}

	pub fn clear(&mut self) {
		self.clear_existing();
		self.clear_imported();
	}
}

fn validated_id<E: MappedEntity>(entity_id: &str) -> Result<&str, Error> {
	if entity_id.trim().is_empty() {
		return Err(Error::InvalidEntityId {
			kind: E::KIND,
			id: entity_id.to_string(),
		});
	}

	Ok(entity_id)
}
