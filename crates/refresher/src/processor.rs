use crate::{
	mapper::NodeMapper,
	node::{EntityKind, MappedEntity, NodeId},
	result::RefreshResult,
	Error, NodeVisitor,
};

use ec_catalog::{Content, Pool, Product};

use std::collections::HashSet;

use tracing::{debug, instrument, trace};

/// Runs `$body` with the visitor registered for `$kind`, failing if there is none.
macro_rules! dispatch {
	($visitors:expr, $kind:expr, $as_deref:ident, |$visitor:ident| $body:expr) => {
		match $kind {
			EntityKind::Pool => {
				let $visitor = $visitors
					.pool
					.$as_deref()
					.ok_or(Error::NoVisitor(EntityKind::Pool))?;
				$body
			}
			EntityKind::Product => {
				let $visitor = $visitors
					.product
					.$as_deref()
					.ok_or(Error::NoVisitor(EntityKind::Product))?;
				$body
			}
			EntityKind::Content => {
				let $visitor = $visitors
					.content
					.$as_deref()
					.ok_or(Error::NoVisitor(EntityKind::Content))?;
				$body
			}
		}
	};
}

/// One visitor slot per entity kind.
#[derive(Default)]
pub struct VisitorSet {
	pub(crate) pool: Option<Box<dyn NodeVisitor<Entity = Pool>>>,
	pub(crate) product: Option<Box<dyn NodeVisitor<Entity = Product>>>,
	pub(crate) content: Option<Box<dyn NodeVisitor<Entity = Content>>>,
}

impl VisitorSet {
	fn complete(&mut self) -> Result<(), Error> {
		if let Some(visitor) = self.content.as_deref_mut() {
			visitor.complete()?;
		}

		if let Some(visitor) = self.product.as_deref_mut() {
			visitor.complete()?;
		}

		if let Some(visitor) = self.pool.as_deref_mut() {
			visitor.complete()?;
		}

		Ok(())
	}
}

/// Drives the visitors over a node graph.
///
/// Processing runs three passes:
/// - process: depth first from every root, children strictly before their parents;
/// - prune: in topological order, every parent before its children;
/// - apply: in the processing order again, children before their parents.
#[derive(Default)]
pub struct NodeProcessor {
	mapper: Option<NodeMapper>,
	visitors: VisitorSet,
}

impl NodeProcessor {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_node_mapper(mut self, mapper: NodeMapper) -> Self {
		self.mapper = Some(mapper);
		self
	}

	/// Registers the visitor of an entity kind, replacing any previous one.
	#[must_use]
	pub fn with_visitor<V>(mut self, visitor: V) -> Self
	where
		V: NodeVisitor + 'static,
	{
		*<V::Entity as MappedEntity>::visitor_slot(&mut self.visitors) = Some(Box::new(visitor));
		self
	}

	pub const fn node_mapper(&self) -> Option<&NodeMapper> {
		self.mapper.as_ref()
	}

	pub fn into_node_mapper(self) -> Option<NodeMapper> {
		self.mapper
	}

	/// Processes every node reachable from a root. Nodes visited by an earlier call are skipped.
	///
	/// Any error leaves the graph partially processed, and results can't be compiled from it.
	#[instrument(skip(self), err)]
	pub fn process_nodes(&mut self) -> Result<(), Error> {
		let Self { mapper, visitors } = self;
		let mapper = mapper.as_mut().ok_or(Error::NoNodeMapper)?;

		let roots = mapper.root_nodes().collect::<Vec<_>>();
		let mut order = Vec::with_capacity(mapper.len());
		let mut in_progress = HashSet::new();

		for root in roots {
			visit(mapper, visitors, &mut order, &mut in_progress, root)?;
		}

		debug!(
			roots_count = mapper.root_nodes().count(),
			processed_count = order.len(),
			"Processed nodes;",
		);

		// Reverse post-order puts every parent before its children
		for id in order.iter().rev().copied() {
			dispatch!(visitors, id.kind(), as_deref_mut, |visitor| {
				visitor.prune_node(mapper, id)
			})?;
		}

		trace!("Pruned nodes;");

		for id in order.iter().copied() {
			dispatch!(visitors, id.kind(), as_deref_mut, |visitor| {
				visitor.apply_changes(mapper, id)
			})?;
		}

		trace!("Applied changes;");

		Ok(())
	}

	/// Flushes every visitor's deferred writes and tallies every node.
	///
	/// Fails without flushing anything if any node is unvisited.
	#[instrument(skip(self), err)]
	pub fn compile_results(&mut self) -> Result<RefreshResult, Error> {
		let Self { mapper, visitors } = self;
		let mapper = mapper.as_ref().ok_or(Error::NoNodeMapper)?;

		for id in mapper.all_nodes() {
			let node = mapper.graph_node(id)?;
			if !node.visited() {
				return Err(Error::UnvisitedNode(node.key()));
			}
		}

		visitors.complete()?;

		let mut result = RefreshResult::new();
		for id in mapper.all_nodes() {
			dispatch!(visitors, id.kind(), as_deref, |visitor| {
				visitor.compile_results(&mut result, mapper, id)
			})?;
		}

		debug!(
			products_count = result.products().len(),
			contents_count = result.contents().len(),
			"Compiled refresh results;",
		);

		Ok(result)
	}
}

fn visit(
	mapper: &mut NodeMapper,
	visitors: &mut VisitorSet,
	order: &mut Vec<NodeId>,
	in_progress: &mut HashSet<NodeId>,
	id: NodeId,
) -> Result<(), Error> {
	let node = mapper.graph_node(id)?;
	if node.visited() {
		return Ok(());
	}

	if !in_progress.insert(id) {
		return Err(Error::Cycle(node.key()));
	}

	let children = node.children().to_vec();
	for child in children {
		visit(mapper, visitors, order, in_progress, child)?;
	}

	dispatch!(visitors, id.kind(), as_deref_mut, |visitor| {
		visitor.process_node(mapper, id)
	})?;

	mapper.mark_visited(id)?;
	in_progress.remove(&id);
	order.push(id);

	Ok(())
}
