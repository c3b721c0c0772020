use crate::{
	mapper::NodeMapper,
	node::{NodeId, NodeState},
	Error, NodeVisitor,
};

use ec_catalog::Pool;

/// Pools are never refreshed, they only root product subtrees. Every pool node is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolNodeVisitor;

impl NodeVisitor for PoolNodeVisitor {
	type Entity = Pool;

	fn process_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		mapper.node_mut::<Pool>(id)?.set_state(NodeState::Skipped);
		Ok(())
	}

	fn complete(&mut self) -> Result<(), Error> {
		Ok(())
	}
}
