use crate::{
	mapper::NodeMapper,
	node::{EntityNode, MappedEntity, NodeId, NodeKey, NodeState},
	result::{EntityState, RefreshResult},
	Error,
};

mod content;
mod pool;
mod product;

pub use content::ContentNodeVisitor;
pub use pool::PoolNodeVisitor;
pub use product::ProductNodeVisitor;

pub(crate) use product::ProductChildren;

/// Reconciles the nodes of one entity kind.
///
/// Visitors are driven by a [`NodeProcessor`](crate::NodeProcessor) through three passes, then
/// asked to flush their deferred writes and to tally their nodes. One visitor instance serves
/// exactly one refresh.
pub trait NodeVisitor {
	type Entity: MappedEntity;

	/// Decides the node's state and, for created or updated nodes, its merged entity.
	///
	/// Every child of the node has been processed when this runs. Nodes which already have a
	/// state are left untouched.
	fn process_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error>;

	/// Clears obsolete entities for deletion. Runs after every parent of the node was pruned.
	fn prune_node(&mut self, _mapper: &mut NodeMapper, _id: NodeId) -> Result<(), Error> {
		Ok(())
	}

	/// Finalizes changed nodes. Runs after the same pass reached every child of the node.
	fn apply_changes(&mut self, _mapper: &mut NodeMapper, _id: NodeId) -> Result<(), Error> {
		Ok(())
	}

	/// Flushes every deferred write and resets the visitor's bookkeeping. Calling it again
	/// without further processing has no effect.
	fn complete(&mut self) -> Result<(), Error>;

	/// Folds the outcome of a visited node into `result`.
	fn compile_results(
		&self,
		result: &mut RefreshResult,
		mapper: &NodeMapper,
		id: NodeId,
	) -> Result<(), Error> {
		let node = mapper.node::<Self::Entity>(id)?;

		if !node.visited() {
			return Err(Error::UnvisitedNode(node.key()));
		}

		let state = node.state().ok_or_else(|| Error::StatelessNode(node.key()))?;
		let Some(state) = EntityState::from_node_state(state) else {
			return Ok(());
		};

		let entity = match state {
			EntityState::Created | EntityState::Updated => node.merged(),
			EntityState::Unchanged | EntityState::Deleted => node.existing(),
		};

		if let Some(entity) = entity {
			result.add_entity(state, entity.clone());
		}

		Ok(())
	}
}

/// Checks that the node's existing entity is no longer present upstream, and that no parent
/// which is kept references it. Custom entities are never cleared.
pub(crate) fn cleared_for_deletion<E: MappedEntity>(
	mapper: &NodeMapper,
	node: &EntityNode<E, E::Info>,
) -> Result<bool, Error> {
	let Some(existing) = node.existing() else {
		return Ok(false);
	};

	if !existing.is_locked() || node.imported().is_some() {
		return Ok(false);
	}

	for parent in node.parents() {
		if mapper.graph_node(*parent)?.state() != Some(NodeState::Deleted) {
			return Ok(false);
		}
	}

	Ok(true)
}

/// Resolves a declared child of `parent`, which must have been processed already.
pub(crate) fn lookup_child<'a, E: MappedEntity>(
	mapper: &'a NodeMapper,
	parent: NodeId,
	entity_id: &str,
) -> Result<&'a EntityNode<E, E::Info>, Error> {
	let child_key = || NodeKey::new(E::KIND, entity_id);

	let Some(id) = mapper.child_node(parent, E::KIND, entity_id) else {
		return Err(Error::MissingChildNode {
			parent: mapper.key(parent)?,
			child: child_key(),
		});
	};

	let child = mapper.node::<E>(id)?;
	if child.state().is_none() {
		return Err(Error::UnprocessedChildNode {
			parent: mapper.key(parent)?,
			child: child_key(),
		});
	}

	Ok(child)
}
