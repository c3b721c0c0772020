use crate::node::{EntityKind, MappedEntity, NodeState};

use ec_catalog::{Content, Entity, Product};

use std::collections::BTreeMap;

use serde::Serialize;
use strum::Display;

/// Final state of an entity after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
	Created,
	Updated,
	Unchanged,
	Deleted,
}

impl EntityState {
	/// Every state an entity can still be used in after a refresh.
	pub const ACTIVE: [Self; 3] = [Self::Created, Self::Updated, Self::Unchanged];

	/// Skipped nodes have no entity state.
	#[must_use]
	pub const fn from_node_state(state: NodeState) -> Option<Self> {
		match state {
			NodeState::Created => Some(Self::Created),
			NodeState::Updated => Some(Self::Updated),
			NodeState::Unchanged => Some(Self::Unchanged),
			NodeState::Deleted => Some(Self::Deleted),
			NodeState::Skipped => None,
		}
	}
}

/// Refreshed entities of one kind, keyed by business ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStates<E> {
	entities: BTreeMap<String, (EntityState, E)>,
}

impl<E> Default for EntityStates<E> {
	fn default() -> Self {
		Self {
			entities: BTreeMap::new(),
		}
	}
}

impl<E: Entity> EntityStates<E> {
	/// Records an entity, replacing any previous record of the same business ID.
	pub fn add(&mut self, state: EntityState, entity: E) {
		self.entities
			.insert(entity.entity_id().to_string(), (state, entity));
	}

	pub fn entity(&self, entity_id: &str) -> Option<&E> {
		self.entities.get(entity_id).map(|(_, entity)| entity)
	}

	pub fn state(&self, entity_id: &str) -> Option<EntityState> {
		self.entities.get(entity_id).map(|(state, _)| *state)
	}

	pub fn entities(&self, state: EntityState) -> impl Iterator<Item = &E> + '_ {
		self.entities
			.values()
			.filter(move |(entity_state, _)| *entity_state == state)
			.map(|(_, entity)| entity)
	}

	pub fn entities_in<'a>(&'a self, states: &'a [EntityState]) -> impl Iterator<Item = &'a E> + 'a {
		self.entities
			.values()
			.filter(|(state, _)| states.contains(state))
			.map(|(_, entity)| entity)
	}

	pub fn count(&self, state: EntityState) -> usize {
		self.entities(state).count()
	}

	pub fn len(&self) -> usize {
		self.entities.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entities.is_empty()
	}
}

/// Outcome of a refresh: the final state of every product and content it covered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshResult {
	pub(crate) products: EntityStates<Product>,
	pub(crate) contents: EntityStates<Content>,
}

impl RefreshResult {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an entity of a tallied kind. Kinds that are not tallied are ignored.
	pub fn add_entity<E: MappedEntity>(&mut self, state: EntityState, entity: E) {
		if let Some(states) = E::results(self) {
			states.add(state, entity);
		}
	}

	pub const fn products(&self) -> &EntityStates<Product> {
		&self.products
	}

	pub const fn contents(&self) -> &EntityStates<Content> {
		&self.contents
	}

	pub fn entity_state(&self, kind: EntityKind, entity_id: &str) -> Option<EntityState> {
		match kind {
			EntityKind::Product => self.products.state(entity_id),
			EntityKind::Content => self.contents.state(entity_id),
			EntityKind::Pool => None,
		}
	}

	/// Business IDs of the entities of `kind` which ended up in `state`.
	pub fn entity_ids(&self, kind: EntityKind, state: EntityState) -> Vec<&str> {
		match kind {
			EntityKind::Product => self
				.products
				.entities(state)
				.map(|product| product.id.as_str())
				.collect(),
			EntityKind::Content => self
				.contents
				.entities(state)
				.map(|content| content.id.as_str())
				.collect(),
			EntityKind::Pool => Vec::new(),
		}
	}

	pub fn count(&self, kind: EntityKind, state: EntityState) -> usize {
		match kind {
			EntityKind::Product => self.products.count(state),
			EntityKind::Content => self.contents.count(state),
			EntityKind::Pool => 0,
		}
	}
}
