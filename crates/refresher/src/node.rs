use crate::{mapper::NodeMapper, processor::VisitorSet, result::EntityStates, NodeVisitor, RefreshResult};

use ec_catalog::{
	Content, ContentInfo, Entity, EntityInfo, Owner, Pool, Product, ProductInfo, SubscriptionInfo,
};

use std::fmt;

use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	Pool,
	Product,
	Content,
}

/// Outcome of a node within one refresh. A node without a state has not been processed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
	Unchanged,
	Created,
	Updated,
	Deleted,
	Skipped,
}

impl NodeState {
	/// Whether the node resolved to a new or modified entity.
	#[must_use]
	pub const fn changed(self) -> bool {
		matches!(self, Self::Created | Self::Updated)
	}
}

/// Handle of a node within its [`NodeMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	pub(crate) kind: EntityKind,
	pub(crate) index: usize,
}

impl NodeId {
	#[must_use]
	pub const fn kind(self) -> EntityKind {
		self.kind
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.kind, self.index)
	}
}

/// Identity of a node: the entity kind and business ID it represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
	pub kind: EntityKind,
	pub entity_id: String,
}

impl NodeKey {
	pub fn new(kind: EntityKind, entity_id: impl Into<String>) -> Self {
		Self {
			kind,
			entity_id: entity_id.into(),
		}
	}
}

impl fmt::Display for NodeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} <id='{}'>", self.kind, self.entity_id)
	}
}

/// An entity kind the refresh graph can hold.
pub trait MappedEntity: Entity + Send + 'static {
	type Info: EntityInfo + Send + 'static;

	const KIND: EntityKind;

	#[doc(hidden)]
	fn arena(mapper: &NodeMapper) -> &[EntityNode<Self, Self::Info>];

	#[doc(hidden)]
	fn arena_mut(mapper: &mut NodeMapper) -> &mut Vec<EntityNode<Self, Self::Info>>;

	#[doc(hidden)]
	fn visitor_slot(visitors: &mut VisitorSet) -> &mut Option<Box<dyn NodeVisitor<Entity = Self>>>;

	/// Where nodes of this kind are tallied, if they are tallied at all.
	#[doc(hidden)]
	fn results(result: &mut RefreshResult) -> Option<&mut EntityStates<Self>>;
}

impl MappedEntity for Pool {
	type Info = SubscriptionInfo;

	const KIND: EntityKind = EntityKind::Pool;

	fn arena(mapper: &NodeMapper) -> &[EntityNode<Self, Self::Info>] {
		&mapper.pools
	}

	fn arena_mut(mapper: &mut NodeMapper) -> &mut Vec<EntityNode<Self, Self::Info>> {
		&mut mapper.pools
	}

	fn visitor_slot(visitors: &mut VisitorSet) -> &mut Option<Box<dyn NodeVisitor<Entity = Self>>> {
		&mut visitors.pool
	}

	fn results(_: &mut RefreshResult) -> Option<&mut EntityStates<Self>> {
		None
	}
}

impl MappedEntity for Product {
	type Info = ProductInfo;

	const KIND: EntityKind = EntityKind::Product;

	fn arena(mapper: &NodeMapper) -> &[EntityNode<Self, Self::Info>] {
		&mapper.products
	}

	fn arena_mut(mapper: &mut NodeMapper) -> &mut Vec<EntityNode<Self, Self::Info>> {
		&mut mapper.products
	}

	fn visitor_slot(visitors: &mut VisitorSet) -> &mut Option<Box<dyn NodeVisitor<Entity = Self>>> {
		&mut visitors.product
	}

	fn results(result: &mut RefreshResult) -> Option<&mut EntityStates<Self>> {
		Some(&mut result.products)
	}
}

impl MappedEntity for Content {
	type Info = ContentInfo;

	const KIND: EntityKind = EntityKind::Content;

	fn arena(mapper: &NodeMapper) -> &[EntityNode<Self, Self::Info>] {
		&mapper.contents
	}

	fn arena_mut(mapper: &mut NodeMapper) -> &mut Vec<EntityNode<Self, Self::Info>> {
		&mut mapper.contents
	}

	fn visitor_slot(visitors: &mut VisitorSet) -> &mut Option<Box<dyn NodeVisitor<Entity = Self>>> {
		&mut visitors.content
	}

	fn results(result: &mut RefreshResult) -> Option<&mut EntityStates<Self>> {
		Some(&mut result.contents)
	}
}

/// Kind-erased view of a node, for graph traversal.
pub trait GraphNode: fmt::Debug {
	fn key(&self) -> NodeKey;
	fn owner(&self) -> &Owner;
	fn state(&self) -> Option<NodeState>;
	fn visited(&self) -> bool;
	fn parents(&self) -> &[NodeId];
	fn children(&self) -> &[NodeId];
}

/// One entity identity within a refresh, with everything known about it.
#[derive(Debug)]
pub struct EntityNode<E, I> {
	owner: Owner,
	entity_id: String,
	existing: Option<E>,
	imported: Option<I>,
	merged: Option<E>,
	candidates: Vec<E>,
	state: Option<NodeState>,
	parents: Vec<NodeId>,
	children: Vec<NodeId>,
	visited: bool,
}

impl<E: MappedEntity> EntityNode<E, E::Info> {
	pub fn new(owner: Owner, entity_id: impl Into<String>) -> Self {
		Self {
			owner,
			entity_id: entity_id.into(),
			existing: None,
			imported: None,
			merged: None,
			candidates: Vec::new(),
			state: None,
			parents: Vec::new(),
			children: Vec::new(),
			visited: false,
		}
	}

	#[must_use]
	pub fn with_existing(mut self, existing: Option<E>) -> Self {
		self.existing = existing;
		self
	}

	#[must_use]
	pub fn with_imported(mut self, imported: Option<E::Info>) -> Self {
		self.imported = imported;
		self
	}

	/// Other persisted entities with the same business ID, for version resolution.
	#[must_use]
	pub fn with_candidates(mut self, candidates: Vec<E>) -> Self {
		self.candidates = candidates;
		self
	}

	pub fn owner(&self) -> &Owner {
		&self.owner
	}

	pub fn entity_id(&self) -> &str {
		&self.entity_id
	}

	pub fn key(&self) -> NodeKey {
		NodeKey::new(E::KIND, &self.entity_id)
	}

	pub const fn existing(&self) -> Option<&E> {
		self.existing.as_ref()
	}

	pub const fn imported(&self) -> Option<&E::Info> {
		self.imported.as_ref()
	}

	pub const fn merged(&self) -> Option<&E> {
		self.merged.as_ref()
	}

	pub fn candidates(&self) -> &[E] {
		&self.candidates
	}

	pub const fn state(&self) -> Option<NodeState> {
		self.state
	}

	pub const fn visited(&self) -> bool {
		self.visited
	}

	pub fn parents(&self) -> &[NodeId] {
		&self.parents
	}

	pub fn children(&self) -> &[NodeId] {
		&self.children
	}

	pub fn is_root(&self) -> bool {
		self.parents.is_empty()
	}

	pub fn is_leaf(&self) -> bool {
		self.children.is_empty()
	}

	/// Whether the node resolved to a new or modified entity.
	pub fn changed(&self) -> bool {
		self.state.is_some_and(NodeState::changed)
	}

	/// The entity this node ends up with: the merged entity if it changed, the existing one
	/// otherwise.
	pub fn resolved_entity(&self) -> Option<&E> {
		if self.changed() {
			self.merged.as_ref()
		} else {
			self.existing.as_ref()
		}
	}

	/// Sets the node's state unless it already has one. Returns whether the state was set.
	pub fn set_state(&mut self, state: NodeState) -> bool {
		if self.state.is_some() {
			return false;
		}

		self.state = Some(state);
		true
	}

	/// Clears the node for deletion, overriding whatever processing decided.
	pub fn set_deleted(&mut self) {
		self.state = Some(NodeState::Deleted);
		self.merged = None;
	}

	pub fn set_merged(&mut self, merged: Option<E>) {
		self.merged = merged;
	}

	pub(crate) fn mark_visited(&mut self) {
		self.visited = true;
	}

	pub(crate) fn add_parent(&mut self, parent: NodeId) {
		if !self.parents.contains(&parent) {
			self.parents.push(parent);
		}
	}

	pub(crate) fn add_child(&mut self, child: NodeId) {
		if !self.children.contains(&child) {
			self.children.push(child);
		}
	}
}

impl<E: MappedEntity> GraphNode for EntityNode<E, E::Info> {
	fn key(&self) -> NodeKey {
		Self::key(self)
	}

	fn owner(&self) -> &Owner {
		&self.owner
	}

	fn state(&self) -> Option<NodeState> {
		self.state
	}

	fn visited(&self) -> bool {
		self.visited
	}

	fn parents(&self) -> &[NodeId] {
		&self.parents
	}

	fn children(&self) -> &[NodeId] {
		&self.children
	}
}
