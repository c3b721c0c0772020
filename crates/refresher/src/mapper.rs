use crate::{
	node::{EntityKind, EntityNode, GraphNode, MappedEntity, NodeId, NodeKey},
	Error,
};

use ec_catalog::{Content, ContentInfo, Pool, Product, ProductInfo, SubscriptionInfo};

use std::collections::HashMap;

/// Runs `$body` against the node behind `$id`, typed for its kind.
macro_rules! with_node {
	($mapper:expr, $id:expr, $get:ident, |$node:ident| $body:expr) => {
		match $id.kind {
			EntityKind::Pool => $mapper.pools.$get($id.index).map(|$node| $body),
			EntityKind::Product => $mapper.products.$get($id.index).map(|$node| $body),
			EntityKind::Content => $mapper.contents.$get($id.index).map(|$node| $body),
		}
	};
}

/// Owns the node graph of one refresh.
///
/// Nodes live in one arena per entity kind and refer to each other by [`NodeId`]. Iteration
/// follows the order in which nodes were added.
#[derive(Debug, Default)]
pub struct NodeMapper {
	pub(crate) pools: Vec<EntityNode<Pool, SubscriptionInfo>>,
	pub(crate) products: Vec<EntityNode<Product, ProductInfo>>,
	pub(crate) contents: Vec<EntityNode<Content, ContentInfo>>,
	lookup: HashMap<NodeKey, NodeId>,
	order: Vec<NodeId>,
}

impl NodeMapper {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_node<E: MappedEntity>(&mut self, node: EntityNode<E, E::Info>) -> Result<NodeId, Error> {
		let key = node.key();
		if self.lookup.contains_key(&key) {
			return Err(Error::DuplicateNode(key));
		}

		let arena = E::arena_mut(self);
		let id = NodeId {
			kind: E::KIND,
			index: arena.len(),
		};
		arena.push(node);

		self.lookup.insert(key, id);
		self.order.push(id);

		Ok(id)
	}

	/// Links two nodes in both directions. Linking twice is a no-op.
	pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
		with_node!(self, parent, get_mut, |node| node.add_child(child))
			.ok_or(Error::InvalidNode(parent))?;
		with_node!(self, child, get_mut, |node| node.add_parent(parent))
			.ok_or(Error::InvalidNode(child))
	}

	pub fn node_id(&self, kind: EntityKind, entity_id: &str) -> Option<NodeId> {
		// Keys own their ID, so a lookup needs one
		self.lookup.get(&NodeKey::new(kind, entity_id)).copied()
	}

	pub fn node<E: MappedEntity>(&self, id: NodeId) -> Result<&EntityNode<E, E::Info>, Error> {
		if id.kind != E::KIND {
			return Err(Error::InvalidNode(id));
		}

		E::arena(self).get(id.index).ok_or(Error::InvalidNode(id))
	}

	pub fn node_mut<E: MappedEntity>(
		&mut self,
		id: NodeId,
	) -> Result<&mut EntityNode<E, E::Info>, Error> {
		if id.kind != E::KIND {
			return Err(Error::InvalidNode(id));
		}

		E::arena_mut(self)
			.get_mut(id.index)
			.ok_or(Error::InvalidNode(id))
	}

	/// Looks a node up by business ID.
	pub fn find<E: MappedEntity>(&self, entity_id: &str) -> Option<&EntityNode<E, E::Info>> {
		self.node_id(E::KIND, entity_id)
			.and_then(|id| self.node::<E>(id).ok())
	}

	pub fn graph_node(&self, id: NodeId) -> Result<&dyn GraphNode, Error> {
		with_node!(self, id, get, |node| {
			let node: &dyn GraphNode = node;
			node
		})
		.ok_or(Error::InvalidNode(id))
	}

	pub fn key(&self, id: NodeId) -> Result<NodeKey, Error> {
		self.graph_node(id).map(|node| node.key())
	}

	/// Resolves a child of `parent` by kind and business ID.
	///
	/// Only nodes linked as children of `parent` are considered, so a reference to an entity
	/// elsewhere in the graph does not resolve.
	pub fn child_node(&self, parent: NodeId, kind: EntityKind, entity_id: &str) -> Option<NodeId> {
		let id = self.node_id(kind, entity_id)?;

		self.graph_node(parent)
			.ok()
			.filter(|node| node.children().contains(&id))
			.map(|_| id)
	}

	/// Nodes without parents, in insertion order.
	pub fn root_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.order.iter().copied().filter(|id| {
			self.graph_node(*id)
				.map(|node| node.parents().is_empty())
				.unwrap_or_default()
		})
	}

	/// Every node, in insertion order, reachable from a root or not.
	pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.order.iter().copied()
	}

	pub(crate) fn mark_visited(&mut self, id: NodeId) -> Result<(), Error> {
		with_node!(self, id, get_mut, |node| node.mark_visited()).ok_or(Error::InvalidNode(id))
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use ec_catalog::Owner;

	use pretty_assertions::assert_eq;

	#[test]
	fn edges_are_linked_both_ways() {
		let owner = Owner::new("acme");
		let mut mapper = NodeMapper::new();

		let product = mapper
			.add_node(EntityNode::<Product, _>::new(owner.clone(), "p1"))
			.unwrap();
		let content = mapper
			.add_node(EntityNode::<Content, _>::new(owner, "c1"))
			.unwrap();
		mapper.add_edge(product, content).unwrap();
		mapper.add_edge(product, content).unwrap();

		assert_eq!(mapper.graph_node(product).unwrap().children(), &[content]);
		assert_eq!(mapper.graph_node(content).unwrap().parents(), &[product]);
		assert_eq!(mapper.root_nodes().collect::<Vec<_>>(), vec![product]);
		assert_eq!(mapper.all_nodes().count(), 2);
	}

	#[test]
	fn child_lookup_is_scoped_to_the_parent() {
		let owner = Owner::new("acme");
		let mut mapper = NodeMapper::new();

		let p1 = mapper
			.add_node(EntityNode::<Product, _>::new(owner.clone(), "p1"))
			.unwrap();
		let p2 = mapper
			.add_node(EntityNode::<Product, _>::new(owner.clone(), "p2"))
			.unwrap();
		let c1 = mapper
			.add_node(EntityNode::<Content, _>::new(owner, "c1"))
			.unwrap();
		mapper.add_edge(p1, c1).unwrap();

		assert_eq!(mapper.child_node(p1, EntityKind::Content, "c1"), Some(c1));
		assert_eq!(mapper.child_node(p2, EntityKind::Content, "c1"), None);
		assert_eq!(mapper.child_node(p1, EntityKind::Product, "c1"), None);
	}

	#[test]
	fn nodes_are_unique_per_kind_and_id() {
		let owner = Owner::new("acme");
		let mut mapper = NodeMapper::new();

		mapper
			.add_node(EntityNode::<Product, _>::new(owner.clone(), "x"))
			.unwrap();
		mapper
			.add_node(EntityNode::<Content, _>::new(owner.clone(), "x"))
			.unwrap();

		assert!(matches!(
			mapper.add_node(EntityNode::<Product, _>::new(owner, "x")),
			Err(Error::DuplicateNode(_))
		));
	}

	#[test]
	fn typed_access_checks_the_kind() {
		let owner = Owner::new("acme");
		let mut mapper = NodeMapper::new();
		let id = mapper
			.add_node(EntityNode::<Content, _>::new(owner, "c1"))
			.unwrap();

		assert!(mapper.node::<Content>(id).is_ok());
		assert!(matches!(mapper.node::<Product>(id), Err(Error::InvalidNode(_))));
		assert_eq!(mapper.find::<Content>("c1").map(|node| node.entity_id()), Some("c1"));
	}
}
