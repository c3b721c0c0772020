use crate::{
	mapper::NodeMapper,
	node::{EntityNode, NodeId, NodeState},
	Error, NodeVisitor,
};

use ec_catalog::{Content, ContentInfo, Entity, Owner, OwnerContent};
use ec_curator::{ContentCurator, OwnerContentCurator};

use std::{
	collections::{HashMap, HashSet},
	mem,
	sync::Arc,
};

use tracing::{debug, error, instrument, trace};
use uuid::Uuid;

/// Writes collected while visiting, flushed on [`ContentNodeVisitor::complete`].
#[derive(Debug, Default)]
struct PendingChanges {
	owner_contents: Vec<OwnerContent>,
	uuid_rewrites: HashMap<Owner, HashMap<Uuid, Uuid>>,
	deleted_uuids: HashMap<Owner, HashSet<Uuid>>,
}

/// Reconciles content nodes, which are always leaves.
///
/// Merged content is resolved to an equivalent persisted content when one exists, or persisted
/// right away otherwise. Owner mappings are only written on completion.
pub struct ContentNodeVisitor {
	content_curator: Arc<dyn ContentCurator>,
	owner_content_curator: Arc<dyn OwnerContentCurator>,
	pending: PendingChanges,
}

impl ContentNodeVisitor {
	pub fn new(
		content_curator: Arc<dyn ContentCurator>,
		owner_content_curator: Arc<dyn OwnerContentCurator>,
	) -> Self {
		Self {
			content_curator,
			owner_content_curator,
			pending: PendingChanges::default(),
		}
	}

	fn create_entity(node: &EntityNode<Content, ContentInfo>) -> Result<Content, Error> {
		if node.existing().is_none() && node.imported().is_none() {
			return Err(Error::NoSourceEntity(node.key()));
		}

		let mut entity = node.existing().cloned().unwrap_or_else(|| Content {
			locked: true,
			..Content::default()
		});

		entity.id = node.entity_id().to_string();
		entity.uuid = None;
		entity.persisted_version = None;

		if let Some(imported) = node.imported() {
			entity.apply_changes(imported);
		}

		Ok(entity)
	}

	/// Maps `entity` to an equivalent candidate if there is one, persists it otherwise.
	fn resolve_entity_version(
		&self,
		node: &EntityNode<Content, ContentInfo>,
		entity: Content,
	) -> Result<Content, Error> {
		let version = entity.entity_version();

		let candidate = node
			.candidates()
			.iter()
			.find(|candidate| candidate.id == entity.id && candidate.persisted_version == Some(version));

		if let Some(candidate) = candidate {
			if candidate.is_equivalent_to(&entity) {
				trace!(
					content_id = %entity.id,
					%version,
					"Resolved content to an existing version;",
				);

				return Ok(candidate.clone());
			}

			// Same ID and version, but different content: stop matching the stale row
			error!(
				?entity,
				?candidate,
				"Entity version collision detected; attempting resolution...",
			);

			self.content_curator.clear_entity_version(candidate)?;
		}

		self.content_curator
			.save_or_update(entity)
			.map_err(Into::into)
	}
}

impl NodeVisitor for ContentNodeVisitor {
	type Entity = Content;

	fn process_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		let node = mapper.node::<Content>(id)?;

		if node.state().is_some() {
			return Ok(());
		}

		if !node.is_leaf() {
			return Err(Error::NonLeafNode(node.key()));
		}

		let state = match (node.existing(), node.imported()) {
			(Some(existing), Some(imported)) if existing.is_changed_by(imported) => {
				NodeState::Updated
			}
			(None, Some(_)) => NodeState::Created,
			_ => NodeState::Unchanged,
		};

		let merged = if state.changed() {
			let merged = self.resolve_entity_version(node, Self::create_entity(node)?)?;

			match (state, merged.uuid) {
				(NodeState::Updated, Some(merged_uuid)) => {
					if let Some(existing_uuid) = node.existing().and_then(|existing| existing.uuid) {
						if existing_uuid != merged_uuid {
							self.pending
								.uuid_rewrites
								.entry(node.owner().clone())
								.or_default()
								.insert(existing_uuid, merged_uuid);
						}
					}
				}
				(NodeState::Created, Some(merged_uuid)) => {
					self.pending.owner_contents.push(OwnerContent::new(
						node.owner().clone(),
						node.entity_id(),
						merged_uuid,
					));
				}
				_ => {}
			}

			Some(merged)
		} else {
			None
		};

		let node = mapper.node_mut::<Content>(id)?;
		node.set_merged(merged);
		node.set_state(state);

		Ok(())
	}

	fn prune_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		let node = mapper.node::<Content>(id)?;

		if !super::cleared_for_deletion(mapper, node)? {
			return Ok(());
		}

		if let Some(uuid) = node.existing().and_then(|existing| existing.uuid) {
			self.pending
				.deleted_uuids
				.entry(node.owner().clone())
				.or_default()
				.insert(uuid);
		}

		mapper.node_mut::<Content>(id)?.set_deleted();

		Ok(())
	}

	#[instrument(skip(self), err)]
	fn complete(&mut self) -> Result<(), Error> {
		let PendingChanges {
			owner_contents,
			uuid_rewrites,
			deleted_uuids,
		} = mem::take(&mut self.pending);

		for (owner, uuids) in &deleted_uuids {
			let removed = self
				.owner_content_curator
				.remove_owner_content_references(owner, uuids)?;

			debug!(%owner, removed, "Removed owner content references;");
		}

		debug!(
			created_count = owner_contents.len(),
			"Saving new owner content mappings;",
		);
		self.owner_content_curator.save_all(owner_contents, true)?;

		for (owner, uuid_map) in &uuid_rewrites {
			let updated = self
				.owner_content_curator
				.update_owner_content_references(owner, uuid_map)?;

			debug!(%owner, updated, "Updated owner content references;");
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::{node::EntityNode, NodeProcessor};

	use ec_curator::MemoryStore;

	use pretty_assertions::assert_eq;
	use tracing_test::traced_test;

	fn visitor(store: &Arc<MemoryStore>) -> ContentNodeVisitor {
		ContentNodeVisitor::new(Arc::clone(store) as _, Arc::clone(store) as _)
	}

	fn single_node(node: EntityNode<Content, ContentInfo>) -> (NodeMapper, NodeId) {
		let mut mapper = NodeMapper::new();
		let id = mapper.add_node(node).unwrap();
		(mapper, id)
	}

	#[test]
	fn new_content_is_created_and_locked() {
		let store = Arc::new(MemoryStore::new());
		let owner = Owner::new("acme");
		let imported = ContentInfo {
			name: Some("foo".to_string()),
			..ContentInfo::new("X")
		};
		let (mut mapper, id) =
			single_node(EntityNode::new(owner.clone(), "X").with_imported(Some(imported)));

		let mut visitor = visitor(&store);
		visitor.process_node(&mut mapper, id).unwrap();

		let node = mapper.node::<Content>(id).unwrap();
		assert_eq!(node.state(), Some(NodeState::Created));

		let merged = node.merged().unwrap();
		assert_eq!(merged.id, "X");
		assert!(merged.locked);
		assert_eq!(store.content_count(), 1);

		visitor.complete().unwrap();
		assert_eq!(store.owner_content_uuid(&owner, "X"), merged.uuid);
	}

	#[test]
	fn field_diff_updates_and_rewrites_references() {
		let store = Arc::new(MemoryStore::new());
		let owner = Owner::new("acme");
		let existing = store
			.seed_content(
				&owner,
				Content {
					name: Some("foo".to_string()),
					locked: true,
					..Content::new("X")
				},
			)
			.unwrap();

		let imported = ContentInfo {
			name: Some("bar".to_string()),
			..ContentInfo::new("X")
		};
		let (mut mapper, id) = single_node(
			EntityNode::new(owner.clone(), "X")
				.with_existing(Some(existing.clone()))
				.with_imported(Some(imported)),
		);

		let mut visitor = visitor(&store);
		visitor.process_node(&mut mapper, id).unwrap();

		let node = mapper.node::<Content>(id).unwrap();
		assert_eq!(node.state(), Some(NodeState::Updated));

		let merged = node.merged().unwrap().clone();
		assert_eq!(merged.name.as_deref(), Some("bar"));
		assert_ne!(merged.uuid, existing.uuid);

		visitor.complete().unwrap();
		assert_eq!(store.owner_content_uuid(&owner, "X"), merged.uuid);
	}

	#[test]
	fn reprocessing_a_stated_node_is_a_noop() {
		let store = Arc::new(MemoryStore::new());
		let (mut mapper, id) = single_node(
			EntityNode::new(Owner::new("acme"), "X").with_imported(Some(ContentInfo::new("X"))),
		);

		let mut visitor = visitor(&store);
		visitor.process_node(&mut mapper, id).unwrap();
		let merged = mapper.node::<Content>(id).unwrap().merged().cloned();

		visitor.process_node(&mut mapper, id).unwrap();

		let node = mapper.node::<Content>(id).unwrap();
		assert_eq!(node.state(), Some(NodeState::Created));
		assert_eq!(node.merged().cloned(), merged);
		assert_eq!(store.content_count(), 1);
	}

	#[test]
	fn content_with_children_is_rejected() {
		let store = Arc::new(MemoryStore::new());
		let owner = Owner::new("acme");
		let mut mapper = NodeMapper::new();

		let parent = mapper
			.add_node(EntityNode::<Content, _>::new(owner.clone(), "parent"))
			.unwrap();
		let child = mapper
			.add_node(EntityNode::<Content, _>::new(owner, "child"))
			.unwrap();
		mapper.add_edge(parent, child).unwrap();

		assert!(matches!(
			visitor(&store).process_node(&mut mapper, parent),
			Err(Error::NonLeafNode(_))
		));
	}

	#[test]
	#[traced_test]
	fn version_collision_clears_the_candidate() {
		let store = Arc::new(MemoryStore::new());
		let owner = Owner::new("acme");
		let imported = ContentInfo {
			name: Some("foo".to_string()),
			..ContentInfo::new("X")
		};

		let mut expected = Content {
			locked: true,
			..Content::new("X")
		};
		expected.apply_changes(&imported);

		// Same ID and stored version, different fields
		let mut impostor = store
			.save_or_update(Content {
				name: Some("impostor".to_string()),
				..Content::new("X")
			})
			.unwrap();
		impostor.persisted_version = Some(expected.entity_version());

		let (mut mapper, id) = single_node(
			EntityNode::new(owner, "X")
				.with_imported(Some(imported))
				.with_candidates(vec![impostor.clone()]),
		);

		let mut processor = NodeProcessor::new()
			.with_node_mapper(mapper)
			.with_visitor(visitor(&store));
		processor.process_nodes().unwrap();
		mapper = processor.into_node_mapper().unwrap();

		let merged = mapper.node::<Content>(id).unwrap().merged().unwrap();
		assert_ne!(merged.uuid, impostor.uuid);
		assert_eq!(store.content(impostor.uuid.unwrap()).unwrap().persisted_version, None);
		assert!(logs_contain("Entity version collision detected"));
	}
}
