use crate::node::{EntityKind, NodeId, NodeKey};

use thiserror::Error;

/// Failures of a refresh. Every variant but `Curator` means the node graph was built or
/// processed incorrectly, and the whole refresh must be abandoned.
#[derive(Debug, Error)]
pub enum Error {
	#[error("no node mapper set")]
	NoNodeMapper,
	#[error("no visitor registered for entity kind: {0}")]
	NoVisitor(EntityKind),
	#[error("invalid node id: {0}")]
	InvalidNode(NodeId),
	#[error("node already mapped: {0}")]
	DuplicateNode(NodeKey),
	#[error("unknown entity: {0}")]
	UnknownEntity(NodeKey),
	#[error("{parent} references a child which does not exist: {child}")]
	MissingChildNode { parent: NodeKey, child: NodeKey },
	#[error("child node accessed before it has been processed: {parent} => {child}")]
	UnprocessedChildNode { parent: NodeKey, child: NodeKey },
	#[error("leaf-only node has children: {0}")]
	NonLeafNode(NodeKey),
	#[error("node has not been visited: {0}")]
	UnvisitedNode(NodeKey),
	#[error("node has no state: {0}")]
	StatelessNode(NodeKey),
	#[error("node has neither an existing nor an imported entity: {0}")]
	NoSourceEntity(NodeKey),
	#[error("node graph contains a cycle through: {0}")]
	Cycle(NodeKey),
	#[error("invalid {kind} entity id: {id:?}")]
	InvalidEntityId { kind: EntityKind, id: String },
	#[error("product <id='{0}'> contains an incomplete product-content mapping")]
	IncompleteProductContent(String),

	#[error(transparent)]
	Curator(#[from] ec_curator::Error),
}
