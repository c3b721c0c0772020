use crate::{
	builder::NodeFactory,
	entities::{ContentMapper, PoolMapper, ProductMapper},
	result::EntityState,
	visitors::{ContentNodeVisitor, PoolNodeVisitor, ProductNodeVisitor},
	Error, NodeProcessor, RefreshConfig, RefreshResult,
};

use ec_catalog::{Content, ContentInfo, Entity, Owner, Pool, Product, ProductInfo, SubscriptionInfo};
use ec_curator::Curators;

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Collects the upstream catalog of an owner and refreshes the owner's entities against it.
///
/// A worker can be reused: imported entities stay mapped across executions until cleared.
pub struct RefreshWorker {
	curators: Curators,
	config: RefreshConfig,
	pools: PoolMapper,
	products: ProductMapper,
	contents: ContentMapper,
}

impl RefreshWorker {
	pub fn new(curators: Curators, config: RefreshConfig) -> Self {
		Self {
			curators,
			config,
			pools: PoolMapper::new(),
			products: ProductMapper::new(),
			contents: ContentMapper::new(),
		}
	}

	/// Adds upstream subscriptions, along with the product trees they carry.
	pub fn add_subscriptions(
		&mut self,
		subscriptions: impl IntoIterator<Item = SubscriptionInfo>,
	) -> Result<&mut Self, Error> {
		for subscription in subscriptions {
			if let Some(product) = &subscription.product {
				self.add_product(product)?;
			}

			self.pools.add_imported_entity(subscription)?;
		}

		Ok(self)
	}

	/// Adds upstream products, along with their derived and provided products and content.
	pub fn add_products(
		&mut self,
		products: impl IntoIterator<Item = ProductInfo>,
	) -> Result<&mut Self, Error> {
		for product in products {
			self.add_product(&product)?;
		}

		Ok(self)
	}

	pub fn add_content(
		&mut self,
		contents: impl IntoIterator<Item = ContentInfo>,
	) -> Result<&mut Self, Error> {
		for content in contents {
			self.contents.add_imported_entity(content)?;
		}

		Ok(self)
	}

	fn add_product(&mut self, product: &ProductInfo) -> Result<(), Error> {
		self.products.add_imported_entity(product.clone())?;

		if let Some(derived) = &product.derived_product {
			self.add_product(derived)?;
		}

		for provided in product.provided_products.iter().flatten() {
			self.add_product(provided)?;
		}

		for product_content in product.product_content.iter().flatten() {
			let content = product_content
				.content
				.as_ref()
				.ok_or_else(|| Error::IncompleteProductContent(product.id.clone()))?;

			self.contents.add_imported_entity(content.clone())?;
		}

		Ok(())
	}

	/// Drops every imported and existing entity.
	pub fn clear(&mut self) -> &mut Self {
		self.pools.clear();
		self.products.clear();
		self.contents.clear();

		self
	}

	/// Refreshes the entities of `owner` against the imported catalog.
	///
	/// Existing entities are reloaded from storage on every execution.
	#[instrument(skip(self), fields(owner = %owner), err)]
	pub fn execute(&mut self, owner: &Owner) -> Result<RefreshResult, Error> {
		self.pools.clear_existing();
		self.products.clear_existing();
		self.contents.clear_existing();

		let pools = self.curators.pools.pools_by_owner(owner)?;
		self.map_existing_pools(pools)?;

		let owner_products = self.curators.owner_products.products_by_owner(owner)?;
		self.map_existing_products(owner_products.clone())?;

		let owner_contents = self.curators.owner_contents.content_by_owner(owner)?;
		self.map_existing_contents(owner_contents.clone())?;

		let mapper = NodeFactory::new(
			&self.pools,
			&self.products,
			&self.contents,
			Arc::clone(&self.curators.contents),
		)
		.build_nodes(owner)?;

		let mut processor = NodeProcessor::new()
			.with_node_mapper(mapper)
			.with_visitor(PoolNodeVisitor)
			.with_visitor(ProductNodeVisitor::new(
				Arc::clone(&self.curators.products),
				Arc::clone(&self.curators.owner_products),
				self.config.orphaned_entity_grace_period,
			))
			.with_visitor(ContentNodeVisitor::new(
				Arc::clone(&self.curators.contents),
				Arc::clone(&self.curators.owner_contents),
			));

		processor.process_nodes()?;
		let result = processor.compile_results()?;

		if self.config.rebuild_dirty_mappings {
			let products_dirty = self.products.is_dirty()
				|| !self.products.contains_only_existing_entities(&owner_products);

			if products_dirty {
				warn!(%owner, "Found one or more dirty product mappings; remapping products...");

				let mapping = active_mapping(result.products().entities_in(&EntityState::ACTIVE));
				self.curators
					.owner_products
					.rebuild_owner_product_mapping(owner, &mapping)?;
			}

			let contents_dirty = self.contents.is_dirty()
				|| !self.contents.contains_only_existing_entities(&owner_contents);

			if contents_dirty {
				warn!(%owner, "Found one or more dirty content mappings; remapping content...");

				let mapping = active_mapping(result.contents().entities_in(&EntityState::ACTIVE));
				self.curators
					.owner_contents
					.rebuild_owner_content_mapping(owner, &mapping)?;
			}
		}

		info!(
			%owner,
			products_created = result.products().count(EntityState::Created),
			products_updated = result.products().count(EntityState::Updated),
			products_deleted = result.products().count(EntityState::Deleted),
			contents_created = result.contents().count(EntityState::Created),
			contents_updated = result.contents().count(EntityState::Updated),
			contents_deleted = result.contents().count(EntityState::Deleted),
			"Refresh complete;",
		);

		Ok(result)
	}

	fn map_existing_pools(&mut self, pools: Vec<Pool>) -> Result<(), Error> {
		let product_uuids = pools
			.iter()
			.filter_map(|pool| pool.product_uuid)
			.collect::<HashSet<_>>();

		for pool in pools {
			self.pools.add_existing_entity(pool)?;
		}

		if !product_uuids.is_empty() {
			let products = self.curators.products.products_by_uuids(&product_uuids)?;
			self.map_existing_products(products)?;
		}

		Ok(())
	}

	/// Maps products and, transitively, every child they reference.
	fn map_existing_products(&mut self, products: Vec<Product>) -> Result<(), Error> {
		let mut product_uuids = HashSet::new();
		let mut content_uuids = HashSet::new();

		for product in products {
			let children = product
				.derived_product
				.iter()
				.chain(product.provided_products.values())
				.filter_map(|child| child.uuid)
				.collect::<Vec<_>>();

			let contents = product
				.product_content
				.values()
				.filter_map(|pc| pc.content.uuid)
				.collect::<Vec<_>>();

			if self.products.add_existing_entity(product)? {
				product_uuids.extend(children);
				content_uuids.extend(contents);
			}
		}

		product_uuids.retain(|uuid| !self.is_mapped_product(*uuid));
		if !product_uuids.is_empty() {
			debug!(children_count = product_uuids.len(), "Mapping child products;");

			let children = self.curators.products.products_by_uuids(&product_uuids)?;
			self.map_existing_products(children)?;
		}

		if !content_uuids.is_empty() {
			let contents = self.curators.contents.contents_by_uuids(&content_uuids)?;
			self.map_existing_contents(contents)?;
		}

		Ok(())
	}

	fn map_existing_contents(&mut self, contents: Vec<Content>) -> Result<(), Error> {
		for content in contents {
			self.contents.add_existing_entity(content)?;
		}

		Ok(())
	}

	fn is_mapped_product(&self, uuid: Uuid) -> bool {
		self.products
			.existing_entities()
			.any(|product| product.uuid == Some(uuid))
	}
}

fn active_mapping<'a, E: Entity + 'a>(
	entities: impl Iterator<Item = &'a E>,
) -> HashMap<String, Uuid> {
	entities
		.filter_map(|entity| Some((entity.entity_id().to_string(), entity.uuid()?)))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	use ec_catalog::ProductContentInfo;
	use ec_curator::MemoryStore;

	use pretty_assertions::assert_eq;

	fn worker(store: &Arc<MemoryStore>) -> RefreshWorker {
		RefreshWorker::new(Curators::from_store(Arc::clone(store)), RefreshConfig::default())
	}

	#[test]
	fn nested_imports_are_unpacked() {
		let store = Arc::new(MemoryStore::new());
		let mut worker = worker(&store);

		let product = ProductInfo {
			derived_product: Some(Box::new(ProductInfo::new("derived"))),
			provided_products: Some(vec![ProductInfo::new("provided")]),
			product_content: Some(vec![ProductContentInfo::new(ContentInfo::new("c1"), true)]),
			..ProductInfo::new("p1")
		};

		worker
			.add_subscriptions([SubscriptionInfo::new("s1", Some(product))])
			.unwrap();

		assert_eq!(
			worker.products.entity_ids().into_iter().collect::<Vec<_>>(),
			vec!["derived", "p1", "provided"]
		);
		assert!(worker.contents.has_entity("c1"));
		assert!(worker.pools.has_entity("s1"));

		worker.clear();
		assert!(worker.products.entity_ids().is_empty());
	}

	#[test]
	fn incomplete_product_content_is_rejected() {
		let store = Arc::new(MemoryStore::new());
		let product = ProductInfo {
			product_content: Some(vec![ProductContentInfo {
				content: None,
				enabled: false,
			}]),
			..ProductInfo::new("p1")
		};

		assert!(matches!(
			worker(&store).add_products([product]),
			Err(Error::IncompleteProductContent(id)) if id == "p1"
		));
	}

	#[test]
	fn invalid_ids_are_rejected() {
		let store = Arc::new(MemoryStore::new());

		assert!(matches!(
			worker(&store).add_content([ContentInfo::new("")]),
			Err(Error::InvalidEntityId { .. })
		));
	}
}
