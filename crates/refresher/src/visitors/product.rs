use crate::{
	mapper::NodeMapper,
	node::{EntityKind, EntityNode, MappedEntity, NodeId, NodeKey, NodeState},
	Error, NodeVisitor,
};

use ec_catalog::{
	ChildRef, Content, Entity, EntityVersion, Owner, OwnerProduct, Product, ProductContent,
	ProductInfo,
};
use ec_curator::{OwnerProductCurator, ProductCurator};

use std::{
	collections::{hash_map::Entry, BTreeMap, HashMap, HashSet},
	mem,
	sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, instrument, trace};
use uuid::Uuid;

/// Business IDs of the children a product declares.
///
/// Collections missing from the imported product fall back to the existing product's children.
/// The derived product is the exception: when imported, an absent one removes the local one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProductChildren {
	pub derived: Option<String>,
	pub provided: Vec<String>,
	/// Content ID to its enabled flag.
	pub content: BTreeMap<String, bool>,
}

impl ProductChildren {
	pub fn of(
		entity_id: &str,
		existing: Option<&Product>,
		imported: Option<&ProductInfo>,
	) -> Result<Self, Error> {
		let existing_provided = || -> Vec<String> {
			existing
				.map(|product| product.provided_products.keys().cloned().collect())
				.unwrap_or_default()
		};

		let existing_content = || -> BTreeMap<String, bool> {
			existing
				.map(|product| {
					product
						.product_content
						.iter()
						.map(|(id, pc)| (id.clone(), pc.enabled))
						.collect()
				})
				.unwrap_or_default()
		};

		match (existing, imported) {
			(_, Some(imported)) => {
				let content = match &imported.product_content {
					Some(product_content) => product_content
						.iter()
						.map(|pc| {
							pc.content
								.as_ref()
								.map(|content| (content.id.clone(), pc.enabled))
								.ok_or_else(|| Error::IncompleteProductContent(imported.id.clone()))
						})
						.collect::<Result<_, _>>()?,
					None => existing_content(),
				};

				Ok(Self {
					derived: imported
						.derived_product
						.as_ref()
						.map(|derived| derived.id.clone()),
					provided: imported
						.provided_products
						.as_ref()
						.map_or_else(existing_provided, |provided| {
							provided.iter().map(|product| product.id.clone()).collect()
						}),
					content,
				})
			}
			(Some(existing), None) => Ok(Self {
				derived: existing.derived_product.as_ref().map(|child| child.id.clone()),
				provided: existing_provided(),
				content: existing_content(),
			}),
			(None, None) => Err(Error::NoSourceEntity(NodeKey::new(
				EntityKind::Product,
				entity_id,
			))),
		}
	}

	pub fn product_ids(&self) -> impl Iterator<Item = &str> {
		self.derived
			.iter()
			.chain(self.provided.iter())
			.map(String::as_str)
	}

	pub fn content_ids(&self) -> impl Iterator<Item = &str> {
		self.content.keys().map(String::as_str)
	}
}

/// Writes and lookups collected while visiting, all keyed by owner.
#[derive(Debug, Default)]
struct PendingChanges {
	owner_products: Vec<OwnerProduct>,
	uuid_rewrites: HashMap<Owner, HashMap<Uuid, Uuid>>,
	deleted_uuids: HashMap<Owner, HashSet<Uuid>>,
	entity_versions: HashMap<Owner, HashSet<EntityVersion>>,
	versioned_entities: HashMap<Owner, HashMap<String, Vec<Product>>>,
	orphan_id_precache: HashMap<Owner, HashSet<String>>,
	orphaned_dates: HashMap<Owner, HashMap<String, Option<DateTime<Utc>>>>,
	newly_orphaned: HashMap<Owner, HashSet<String>>,
	unorphaned: HashMap<Owner, HashSet<String>>,
}

/// Reconciles product nodes.
///
/// Changes are decided while processing, but merged products are only persisted once their
/// children are final, when changes are applied. Products left without any kept parent and
/// absent upstream are removed from their owner, after the configured grace period.
pub struct ProductNodeVisitor {
	product_curator: Arc<dyn ProductCurator>,
	owner_product_curator: Arc<dyn OwnerProductCurator>,
	/// Days an orphaned product is kept. Negative keeps them forever, zero removes them at once.
	orphaned_entity_grace_period: i32,
	pending: PendingChanges,
}

impl ProductNodeVisitor {
	pub fn new(
		product_curator: Arc<dyn ProductCurator>,
		owner_product_curator: Arc<dyn OwnerProductCurator>,
		orphaned_entity_grace_period: i32,
	) -> Self {
		Self {
			product_curator,
			owner_product_curator,
			orphaned_entity_grace_period,
			pending: PendingChanges::default(),
		}
	}

	fn create_entity(&mut self, mapper: &NodeMapper, id: NodeId) -> Result<Product, Error> {
		let node = mapper.node::<Product>(id)?;
		if node.existing().is_none() && node.imported().is_none() {
			return Err(Error::NoSourceEntity(node.key()));
		}

		let mut entity = node.existing().cloned().unwrap_or_else(|| Product {
			locked: true,
			..Product::default()
		});

		entity.id = node.entity_id().to_string();
		entity.uuid = None;
		entity.persisted_version = None;

		if let Some(imported) = node.imported() {
			entity.apply_changes(imported);
		}

		resolve_children(mapper, id, &mut entity)?;

		// Versions are looked up in one batch per owner, on the first apply
		self.pending
			.entity_versions
			.entry(node.owner().clone())
			.or_default()
			.insert(entity.entity_version());

		Ok(entity)
	}

	/// Maps the node's merged product to an equivalent persisted product if there is one,
	/// persists it otherwise.
	fn resolve_entity_version(&mut self, mapper: &NodeMapper, id: NodeId) -> Result<Product, Error> {
		let node = mapper.node::<Product>(id)?;
		let mut entity = node
			.merged()
			.cloned()
			.ok_or_else(|| Error::NoSourceEntity(node.key()))?;

		// Children may have resolved to other rows since processing
		resolve_children(mapper, id, &mut entity)?;
		let version = entity.entity_version();

		let versioned = match self.pending.versioned_entities.entry(node.owner().clone()) {
			Entry::Occupied(entry) => entry.into_mut(),
			Entry::Vacant(entry) => {
				let versions = self
					.pending
					.entity_versions
					.remove(node.owner())
					.unwrap_or_default();

				let products = if versions.is_empty() {
					HashMap::new()
				} else {
					self.owner_product_curator.products_by_versions(&versions)?
				};

				trace!(
					owner = %node.owner(),
					versions_count = versions.len(),
					products_count = products.len(),
					"Fetched products by version;",
				);

				entry.insert(products)
			}
		};

		let candidate = versioned
			.get(&entity.id)
			.into_iter()
			.flatten()
			.find(|candidate| candidate.persisted_version == Some(version));

		if let Some(candidate) = candidate {
			if candidate.is_equivalent_to(&entity) {
				trace!(
					product_id = %entity.id,
					%version,
					"Resolved product to an existing version;",
				);

				return Ok(candidate.clone());
			}

			error!(
				?entity,
				?candidate,
				"Entity version collision detected; attempting resolution...",
			);

			self.owner_product_curator
				.clear_product_entity_version(candidate)?;
		}

		self.product_curator
			.create(entity, false)
			.map_err(Into::into)
	}

	/// Like [`super::cleared_for_deletion`], holding orphaned products through the grace period.
	fn cleared_for_deletion(
		&mut self,
		mapper: &NodeMapper,
		node: &EntityNode<Product, ProductInfo>,
	) -> Result<bool, Error> {
		let owner = node.owner();
		let entity_id = node.entity_id();
		let grace_period = self.orphaned_entity_grace_period;

		// Products kept for good lose their orphaned date too
		if grace_period < 0 || !super::cleared_for_deletion(mapper, node)? {
			if self.orphaned_date(owner, entity_id)?.is_some() {
				self.pending
					.unorphaned
					.entry(owner.clone())
					.or_default()
					.insert(entity_id.to_string());
			}

			return Ok(false);
		}

		if grace_period == 0 {
			return Ok(true);
		}

		if let Some(orphaned_date) = self.orphaned_date(owner, entity_id)? {
			let cutoff = Utc::now()
				.date_naive()
				.checked_sub_signed(Duration::days(i64::from(grace_period)));

			return Ok(cutoff.is_some_and(|cutoff| orphaned_date.date_naive() < cutoff));
		}

		self.pending
			.newly_orphaned
			.entry(owner.clone())
			.or_default()
			.insert(entity_id.to_string());

		Ok(false)
	}

	fn orphaned_date(
		&mut self,
		owner: &Owner,
		entity_id: &str,
	) -> Result<Option<DateTime<Utc>>, Error> {
		let dates = self.pending.orphaned_dates.entry(owner.clone()).or_default();

		if let Some(ids) = self.pending.orphan_id_precache.remove(owner) {
			dates.extend(
				self.owner_product_curator
					.owner_product_orphaned_dates(owner, &ids)?,
			);
		}

		if !dates.contains_key(entity_id) {
			if let Some(row) = self.owner_product_curator.owner_product(owner, entity_id)? {
				dates.insert(entity_id.to_string(), row.orphaned_date);
			}
		}

		Ok(dates.get(entity_id).copied().flatten())
	}
}

/// Points the product's children at whatever each child node resolved to.
fn resolve_children(mapper: &NodeMapper, id: NodeId, entity: &mut Product) -> Result<(), Error> {
	fn child_ref<E: MappedEntity>(
		mapper: &NodeMapper,
		parent: NodeId,
		entity_id: &str,
	) -> Result<ChildRef, Error> {
		let child = super::lookup_child::<E>(mapper, parent, entity_id)?;

		child
			.resolved_entity()
			.map(ChildRef::of)
			.ok_or_else(|| Error::NoSourceEntity(child.key()))
	}

	let node = mapper.node::<Product>(id)?;
	let children = ProductChildren::of(node.entity_id(), node.existing(), node.imported())?;

	entity.derived_product = children
		.derived
		.as_deref()
		.map(|child_id| child_ref::<Product>(mapper, id, child_id))
		.transpose()?;

	entity.provided_products = children
		.provided
		.iter()
		.map(|child_id| Ok((child_id.clone(), child_ref::<Product>(mapper, id, child_id)?)))
		.collect::<Result<_, Error>>()?;

	entity.product_content = children
		.content
		.iter()
		.map(|(child_id, enabled)| {
			Ok((
				child_id.clone(),
				ProductContent {
					content: child_ref::<Content>(mapper, id, child_id)?,
					enabled: *enabled,
				},
			))
		})
		.collect::<Result<_, Error>>()?;

	Ok(())
}

impl NodeVisitor for ProductNodeVisitor {
	type Entity = Product;

	fn process_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		let node = mapper.node::<Product>(id)?;

		if node.state().is_some() {
			return Ok(());
		}

		let mut children_updated = false;
		for child in node.children() {
			children_updated |= mapper
				.graph_node(*child)?
				.state()
				.is_some_and(NodeState::changed);
		}

		let state = match (node.existing(), node.imported()) {
			(Some(existing), imported) => {
				self.pending
					.orphan_id_precache
					.entry(node.owner().clone())
					.or_default()
					.insert(node.entity_id().to_string());

				if children_updated || imported.is_some_and(|imported| existing.is_changed_by(imported)) {
					NodeState::Updated
				} else {
					NodeState::Unchanged
				}
			}
			(None, Some(_)) => NodeState::Created,
			(None, None) => NodeState::Unchanged,
		};

		let merged = if state.changed() {
			Some(self.create_entity(mapper, id)?)
		} else {
			None
		};

		let node = mapper.node_mut::<Product>(id)?;
		node.set_merged(merged);
		node.set_state(state);

		Ok(())
	}

	fn prune_node(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		let node = mapper.node::<Product>(id)?;

		let Some(existing) = node.existing() else {
			return Ok(());
		};

		if !self.cleared_for_deletion(mapper, node)? {
			return Ok(());
		}

		if let Some(uuid) = existing.uuid {
			self.pending
				.deleted_uuids
				.entry(node.owner().clone())
				.or_default()
				.insert(uuid);
		}

		mapper.node_mut::<Product>(id)?.set_deleted();

		Ok(())
	}

	fn apply_changes(&mut self, mapper: &mut NodeMapper, id: NodeId) -> Result<(), Error> {
		let node = mapper.node::<Product>(id)?;
		let state = node.state().ok_or_else(|| Error::StatelessNode(node.key()))?;

		if !state.changed() {
			return Ok(());
		}

		let resolved = self.resolve_entity_version(mapper, id)?;
		let node = mapper.node::<Product>(id)?;

		if let Some(resolved_uuid) = resolved.uuid {
			match node.existing().and_then(|existing| existing.uuid) {
				Some(existing_uuid) if existing_uuid != resolved_uuid => {
					self.pending
						.uuid_rewrites
						.entry(node.owner().clone())
						.or_default()
						.insert(existing_uuid, resolved_uuid);
				}
				Some(_) => {}
				None => self.pending.owner_products.push(OwnerProduct::new(
					node.owner().clone(),
					node.entity_id(),
					resolved_uuid,
				)),
			}
		}

		mapper.node_mut::<Product>(id)?.set_merged(Some(resolved));

		Ok(())
	}

	#[instrument(skip(self), err)]
	fn complete(&mut self) -> Result<(), Error> {
		let PendingChanges {
			owner_products,
			uuid_rewrites,
			deleted_uuids,
			newly_orphaned,
			unorphaned,
			..
		} = mem::take(&mut self.pending);

		for (owner, uuids) in &deleted_uuids {
			let removed = self
				.owner_product_curator
				.remove_owner_product_references(owner, uuids)?;

			debug!(%owner, removed, "Removed owner product references;");
		}

		for (owner, product_ids) in &unorphaned {
			let updated = self
				.owner_product_curator
				.update_owner_product_orphaned_dates(owner, product_ids, None)?;

			debug!(%owner, updated, "Cleared orphaned dates of readopted products;");
		}

		let now = Utc::now();
		for (owner, product_ids) in &newly_orphaned {
			let updated = self
				.owner_product_curator
				.update_owner_product_orphaned_dates(owner, product_ids, Some(now))?;

			debug!(%owner, updated, "Flagged newly orphaned products;");
		}

		debug!(
			created_count = owner_products.len(),
			"Saving new owner product mappings;",
		);
		for row in owner_products {
			self.owner_product_curator.create(row, false)?;
		}
		self.owner_product_curator.flush()?;

		for (owner, uuid_map) in &uuid_rewrites {
			let updated = self
				.owner_product_curator
				.update_owner_product_references(owner, uuid_map)?;

			debug!(%owner, updated, "Updated owner product references;");
		}

		Ok(())
	}
}
