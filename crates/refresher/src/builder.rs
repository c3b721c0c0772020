use crate::{
	entities::{ContentMapper, PoolMapper, ProductMapper},
	mapper::NodeMapper,
	node::{EntityNode, MappedEntity, NodeId, NodeKey},
	visitors::ProductChildren,
	Error,
};

use ec_catalog::{Content, Owner, Pool, Product};
use ec_curator::ContentCurator;

use std::{
	cell::RefCell,
	collections::{HashMap, HashSet},
	sync::Arc,
};

use tracing::{debug, instrument, trace};

/// Builds the node of one entity kind, along with every node it depends on.
pub trait NodeBuilder {
	type Entity: MappedEntity;

	/// Adds the node of `entity_id` to `mapper`. Children are built through `factory` first and
	/// linked to the new node.
	fn build_node(
		&self,
		factory: &NodeFactory<'_>,
		mapper: &mut NodeMapper,
		owner: &Owner,
		entity_id: &str,
	) -> Result<NodeId, Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolNodeBuilder;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductNodeBuilder;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNodeBuilder;

/// Turns the entities collected for a refresh into a node graph.
pub struct NodeFactory<'a> {
	pools: &'a PoolMapper,
	products: &'a ProductMapper,
	contents: &'a ContentMapper,
	content_curator: Arc<dyn ContentCurator>,
	content_candidates: HashMap<String, Vec<Content>>,
	/// Nodes whose children are being built.
	building: RefCell<HashSet<NodeKey>>,
}

impl<'a> NodeFactory<'a> {
	pub fn new(
		pools: &'a PoolMapper,
		products: &'a ProductMapper,
		contents: &'a ContentMapper,
		content_curator: Arc<dyn ContentCurator>,
	) -> Self {
		Self {
			pools,
			products,
			contents,
			content_curator,
			content_candidates: HashMap::new(),
			building: RefCell::default(),
		}
	}

	/// Builds a node for every mapped entity of every kind.
	#[instrument(skip(self), fields(owner = %owner), err)]
	pub fn build_nodes(mut self, owner: &Owner) -> Result<NodeMapper, Error> {
		let content_ids = self
			.contents
			.entity_ids()
			.into_iter()
			.map(ToString::to_string)
			.collect::<HashSet<_>>();

		if !content_ids.is_empty() {
			self.content_candidates = self.content_curator.contents_by_ids(&content_ids)?;
		}

		trace!(
			candidates_count = self.content_candidates.values().map(Vec::len).sum::<usize>(),
			"Loaded content candidates;",
		);

		let mut mapper = NodeMapper::new();

		for entity_id in self.pools.entity_ids() {
			self.build_node(&PoolNodeBuilder, &mut mapper, owner, entity_id)?;
		}

		for entity_id in self.products.entity_ids() {
			self.build_node(&ProductNodeBuilder, &mut mapper, owner, entity_id)?;
		}

		for entity_id in self.contents.entity_ids() {
			self.build_node(&ContentNodeBuilder, &mut mapper, owner, entity_id)?;
		}

		debug!(
			nodes_count = mapper.len(),
			roots_count = mapper.root_nodes().count(),
			"Built node graph;",
		);

		Ok(mapper)
	}

	/// Returns the node of `entity_id`, building it with `builder` if it isn't mapped yet.
	pub fn build_node<B: NodeBuilder>(
		&self,
		builder: &B,
		mapper: &mut NodeMapper,
		owner: &Owner,
		entity_id: &str,
	) -> Result<NodeId, Error> {
		let kind = <B::Entity as MappedEntity>::KIND;
		if let Some(id) = mapper.node_id(kind, entity_id) {
			return Ok(id);
		}

		let key = NodeKey::new(kind, entity_id);
		if !self.building.borrow_mut().insert(key.clone()) {
			return Err(Error::Cycle(key));
		}

		let built = builder.build_node(self, mapper, owner, entity_id);
		self.building.borrow_mut().remove(&key);

		built
	}
}

fn unknown<E: MappedEntity>(entity_id: &str) -> Error {
	Error::UnknownEntity(NodeKey::new(E::KIND, entity_id))
}

impl NodeBuilder for PoolNodeBuilder {
	type Entity = Pool;

	fn build_node(
		&self,
		factory: &NodeFactory<'_>,
		mapper: &mut NodeMapper,
		owner: &Owner,
		entity_id: &str,
	) -> Result<NodeId, Error> {
		let existing = factory.pools.existing_entity(entity_id);
		let imported = factory.pools.imported_entity(entity_id);

		let product_id = match (existing, imported) {
			(_, Some(subscription)) => subscription.product.as_ref().map(|product| product.id.as_str()),
			(Some(pool), None) => pool.product_id.as_deref(),
			(None, None) => return Err(unknown::<Pool>(entity_id)),
		};

		let child = product_id
			.map(|product_id| factory.build_node(&ProductNodeBuilder, mapper, owner, product_id))
			.transpose()?;

		let id = mapper.add_node(
			EntityNode::new(owner.clone(), entity_id)
				.with_existing(existing.cloned())
				.with_imported(imported.cloned()),
		)?;

		if let Some(child) = child {
			mapper.add_edge(id, child)?;
		}

		Ok(id)
	}
}

impl NodeBuilder for ProductNodeBuilder {
	type Entity = Product;

	fn build_node(
		&self,
		factory: &NodeFactory<'_>,
		mapper: &mut NodeMapper,
		owner: &Owner,
		entity_id: &str,
	) -> Result<NodeId, Error> {
		let existing = factory.products.existing_entity(entity_id);
		let imported = factory.products.imported_entity(entity_id);

		if existing.is_none() && imported.is_none() {
			return Err(unknown::<Product>(entity_id));
		}

		let declared = ProductChildren::of(entity_id, existing, imported)?;
		let mut children = Vec::new();

		for product_id in declared.product_ids() {
			children.push(factory.build_node(&ProductNodeBuilder, mapper, owner, product_id)?);
		}

		for content_id in declared.content_ids() {
			children.push(factory.build_node(&ContentNodeBuilder, mapper, owner, content_id)?);
		}

		let id = mapper.add_node(
			EntityNode::new(owner.clone(), entity_id)
				.with_existing(existing.cloned())
				.with_imported(imported.cloned()),
		)?;

		for child in children {
			mapper.add_edge(id, child)?;
		}

		Ok(id)
	}
}

impl NodeBuilder for ContentNodeBuilder {
	type Entity = Content;

	fn build_node(
		&self,
		factory: &NodeFactory<'_>,
		mapper: &mut NodeMapper,
		owner: &Owner,
		entity_id: &str,
	) -> Result<NodeId, Error> {
		let existing = factory.contents.existing_entity(entity_id);
		let imported = factory.contents.imported_entity(entity_id);

		if existing.is_none() && imported.is_none() {
			return Err(unknown::<Content>(entity_id));
		}

		let candidates = factory
			.content_candidates
			.get(entity_id)
			.cloned()
			.unwrap_or_default();

		mapper.add_node(
			EntityNode::new(owner.clone(), entity_id)
				.with_existing(existing.cloned())
				.with_imported(imported.cloned())
				.with_candidates(candidates),
		)
	}
}
