use crate::{
	ContentCurator, Error, OwnerContentCurator, OwnerProductCurator, PoolCurator, ProductCurator,
};

use ec_catalog::{
	Content, Entity, EntityVersion, Owner, OwnerContent, OwnerProduct, Pool, Product,
};

use std::{
	collections::{hash_map::Entry, HashMap, HashSet},
	mem,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

type MappingKey = (Uuid, String);

#[derive(Debug, Clone)]
struct ProductMapping {
	owner: Owner,
	product_uuid: Uuid,
	orphaned_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct ContentMapping {
	content_uuid: Uuid,
}

#[derive(Debug, Default)]
struct State {
	products: HashMap<Uuid, Product>,
	contents: HashMap<Uuid, Content>,
	pools: HashMap<Uuid, Vec<Pool>>,
	owner_products: HashMap<MappingKey, ProductMapping>,
	owner_contents: HashMap<MappingKey, ContentMapping>,
	pending_owner_products: Vec<OwnerProduct>,
	pending_owner_contents: Vec<OwnerContent>,
	flushes: usize,
}

/// In-memory implementation of every curator.
///
/// Entity rows are visible as soon as they are written. Join rows inserted without a flush
/// stay pending until the next flush, which fails on a row already mapped for the owner.
#[derive(Debug, Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}

fn key(owner: &Owner, entity_id: &str) -> MappingKey {
	(owner.id, entity_id.to_string())
}

impl State {
	fn flush(&mut self) -> Result<(), Error> {
		let products = mem::take(&mut self.pending_owner_products);
		let contents = mem::take(&mut self.pending_owner_contents);

		trace!(
			products_count = products.len(),
			contents_count = contents.len(),
			"Flushing pending owner mappings;",
		);

		for row in products {
			match self.owner_products.entry(key(&row.owner, &row.product_id)) {
				Entry::Occupied(_) => {
					return Err(Error::DuplicateMapping {
						owner: row.owner,
						entity_id: row.product_id,
					})
				}
				Entry::Vacant(entry) => {
					entry.insert(ProductMapping {
						owner: row.owner,
						product_uuid: row.product_uuid,
						orphaned_date: row.orphaned_date,
					});
				}
			}
		}

		for row in contents {
			match self.owner_contents.entry(key(&row.owner, &row.content_id)) {
				Entry::Occupied(_) => {
					return Err(Error::DuplicateMapping {
						owner: row.owner,
						entity_id: row.content_id,
					})
				}
				Entry::Vacant(entry) => {
					entry.insert(ContentMapping { content_uuid: row.content_uuid });
				}
			}
		}

		self.flushes += 1;

		Ok(())
	}
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Persists a content and maps it to `owner`, returning the stored entity.
	pub fn seed_content(&self, owner: &Owner, content: Content) -> Result<Content, Error> {
		let content = self.save_or_update(content)?;
		if let Some(uuid) = content.uuid {
			self.state.lock().owner_contents.insert(
				key(owner, &content.id),
				ContentMapping { content_uuid: uuid },
			);
		}

		Ok(content)
	}

	/// Persists a product and maps it to `owner`, returning the stored entity.
	pub fn seed_product(&self, owner: &Owner, product: Product) -> Result<Product, Error> {
		let product = ProductCurator::create(self, product, true)?;
		if let Some(uuid) = product.uuid {
			self.state.lock().owner_products.insert(
				key(owner, &product.id),
				ProductMapping {
					owner: owner.clone(),
					product_uuid: uuid,
					orphaned_date: None,
				},
			);
		}

		Ok(product)
	}

	pub fn seed_pool(&self, owner: &Owner, mut pool: Pool) -> Pool {
		pool.uuid.get_or_insert_with(Uuid::new_v4);
		self.state
			.lock()
			.pools
			.entry(owner.id)
			.or_default()
			.push(pool.clone());

		pool
	}

	pub fn set_orphaned_date(&self, owner: &Owner, product_id: &str, date: Option<DateTime<Utc>>) {
		if let Some(mapping) = self.state.lock().owner_products.get_mut(&key(owner, product_id)) {
			mapping.orphaned_date = date;
		}
	}

	#[must_use]
	pub fn product(&self, uuid: Uuid) -> Option<Product> {
		self.state.lock().products.get(&uuid).cloned()
	}

	#[must_use]
	pub fn content(&self, uuid: Uuid) -> Option<Content> {
		self.state.lock().contents.get(&uuid).cloned()
	}

	#[must_use]
	pub fn product_count(&self) -> usize {
		self.state.lock().products.len()
	}

	#[must_use]
	pub fn content_count(&self) -> usize {
		self.state.lock().contents.len()
	}

	/// The product row `owner` maps the business ID to, ignoring pending rows.
	#[must_use]
	pub fn owner_product_uuid(&self, owner: &Owner, product_id: &str) -> Option<Uuid> {
		self.state
			.lock()
			.owner_products
			.get(&key(owner, product_id))
			.map(|mapping| mapping.product_uuid)
	}

	/// The content row `owner` maps the business ID to, ignoring pending rows.
	#[must_use]
	pub fn owner_content_uuid(&self, owner: &Owner, content_id: &str) -> Option<Uuid> {
		self.state
			.lock()
			.owner_contents
			.get(&key(owner, content_id))
			.map(|mapping| mapping.content_uuid)
	}

	#[must_use]
	pub fn flush_count(&self) -> usize {
		self.state.lock().flushes
	}
}

impl ContentCurator for MemoryStore {
	fn save_or_update(&self, mut content: Content) -> Result<Content, Error> {
		let mut state = self.state.lock();

		match content.uuid {
			Some(uuid) if !state.contents.contains_key(&uuid) => {
				return Err(Error::EntityNotFound(uuid))
			}
			Some(_) => {}
			None => content.uuid = Some(Uuid::new_v4()),
		}

		content.persisted_version = Some(content.entity_version());

		if let Some(uuid) = content.uuid {
			state.contents.insert(uuid, content.clone());
		}

		Ok(content)
	}

	fn contents_by_uuids(&self, uuids: &HashSet<Uuid>) -> Result<Vec<Content>, Error> {
		let state = self.state.lock();

		Ok(uuids
			.iter()
			.filter_map(|uuid| state.contents.get(uuid).cloned())
			.collect())
	}

	fn contents_by_ids(&self, ids: &HashSet<String>) -> Result<HashMap<String, Vec<Content>>, Error> {
		let state = self.state.lock();

		Ok(state
			.contents
			.values()
			.filter(|content| ids.contains(&content.id))
			.fold(HashMap::new(), |mut map, content| {
				map.entry(content.id.clone())
					.or_insert_with(Vec::new)
					.push(content.clone());
				map
			}))
	}

	fn clear_entity_version(&self, content: &Content) -> Result<(), Error> {
		let uuid = content.uuid.ok_or_else(|| Error::EntityNotFound(Uuid::nil()))?;

		self.state
			.lock()
			.contents
			.get_mut(&uuid)
			.map(|content| content.persisted_version = None)
			.ok_or(Error::EntityNotFound(uuid))
	}
}

impl OwnerContentCurator for MemoryStore {
	fn content_by_owner(&self, owner: &Owner) -> Result<Vec<Content>, Error> {
		let state = self.state.lock();

		state
			.owner_contents
			.iter()
			.filter(|((owner_id, _), _)| *owner_id == owner.id)
			.map(|(_, mapping)| {
				state
					.contents
					.get(&mapping.content_uuid)
					.cloned()
					.ok_or(Error::EntityNotFound(mapping.content_uuid))
			})
			.collect()
	}

	fn save_all(&self, rows: Vec<OwnerContent>, flush: bool) -> Result<(), Error> {
		let mut state = self.state.lock();
		state.pending_owner_contents.extend(rows);

		if flush {
			state.flush()?;
		}

		Ok(())
	}

	fn remove_owner_content_references(
		&self,
		owner: &Owner,
		uuids: &HashSet<Uuid>,
	) -> Result<usize, Error> {
		let mut state = self.state.lock();
		let before = state.owner_contents.len();

		state.owner_contents.retain(|(owner_id, _), mapping| {
			*owner_id != owner.id || !uuids.contains(&mapping.content_uuid)
		});

		Ok(before - state.owner_contents.len())
	}

	fn update_owner_content_references(
		&self,
		owner: &Owner,
		uuid_map: &HashMap<Uuid, Uuid>,
	) -> Result<usize, Error> {
		let mut state = self.state.lock();
		let mut updated = 0;

		for ((owner_id, _), mapping) in &mut state.owner_contents {
			if *owner_id != owner.id {
				continue;
			}

			if let Some(uuid) = uuid_map.get(&mapping.content_uuid) {
				mapping.content_uuid = *uuid;
				updated += 1;
			}
		}

		Ok(updated)
	}

	fn rebuild_owner_content_mapping(
		&self,
		owner: &Owner,
		mapping: &HashMap<String, Uuid>,
	) -> Result<(), Error> {
		let mut state = self.state.lock();

		state
			.owner_contents
			.retain(|(owner_id, _), _| *owner_id != owner.id);

		for (content_id, uuid) in mapping {
			state.owner_contents.insert(
				key(owner, content_id),
				ContentMapping { content_uuid: *uuid },
			);
		}

		Ok(())
	}

	fn flush(&self) -> Result<(), Error> {
		self.state.lock().flush()
	}
}

impl ProductCurator for MemoryStore {
	fn create(&self, mut product: Product, flush: bool) -> Result<Product, Error> {
		let mut state = self.state.lock();

		if let Some(uuid) = product.uuid {
			return Err(Error::AlreadyPersisted(uuid));
		}

		let uuid = Uuid::new_v4();
		product.uuid = Some(uuid);
		product.persisted_version = Some(product.entity_version());
		state.products.insert(uuid, product.clone());

		if flush {
			state.flush()?;
		}

		Ok(product)
	}

	fn products_by_uuids(&self, uuids: &HashSet<Uuid>) -> Result<Vec<Product>, Error> {
		let state = self.state.lock();

		Ok(uuids
			.iter()
			.filter_map(|uuid| state.products.get(uuid).cloned())
			.collect())
	}
}

impl OwnerProductCurator for MemoryStore {
	fn products_by_owner(&self, owner: &Owner) -> Result<Vec<Product>, Error> {
		let state = self.state.lock();

		state
			.owner_products
			.iter()
			.filter(|((owner_id, _), _)| *owner_id == owner.id)
			.map(|(_, mapping)| {
				state
					.products
					.get(&mapping.product_uuid)
					.cloned()
					.ok_or(Error::EntityNotFound(mapping.product_uuid))
			})
			.collect()
	}

	fn products_by_versions(
		&self,
		versions: &HashSet<EntityVersion>,
	) -> Result<HashMap<String, Vec<Product>>, Error> {
		let state = self.state.lock();
		let mut products = HashMap::<_, Vec<_>>::new();

		for product in state.products.values() {
			if product
				.persisted_version
				.is_some_and(|version| versions.contains(&version))
			{
				products
					.entry(product.id.clone())
					.or_default()
					.push(product.clone());
			}
		}

		Ok(products)
	}

	fn clear_product_entity_version(&self, product: &Product) -> Result<(), Error> {
		let uuid = product.uuid.ok_or_else(|| Error::EntityNotFound(Uuid::nil()))?;

		self.state
			.lock()
			.products
			.get_mut(&uuid)
			.map(|product| product.persisted_version = None)
			.ok_or(Error::EntityNotFound(uuid))
	}

	fn owner_product(&self, owner: &Owner, product_id: &str) -> Result<Option<OwnerProduct>, Error> {
		Ok(self
			.state
			.lock()
			.owner_products
			.get(&key(owner, product_id))
			.map(|mapping| OwnerProduct {
				owner: mapping.owner.clone(),
				product_id: product_id.to_string(),
				product_uuid: mapping.product_uuid,
				orphaned_date: mapping.orphaned_date,
			}))
	}

	fn owner_product_orphaned_dates(
		&self,
		owner: &Owner,
		product_ids: &HashSet<String>,
	) -> Result<HashMap<String, Option<DateTime<Utc>>>, Error> {
		let state = self.state.lock();

		Ok(state
			.owner_products
			.iter()
			.filter(|((owner_id, product_id), _)| {
				*owner_id == owner.id && product_ids.contains(product_id)
			})
			.map(|((_, product_id), mapping)| (product_id.clone(), mapping.orphaned_date))
			.collect())
	}

	fn update_owner_product_orphaned_dates(
		&self,
		owner: &Owner,
		product_ids: &HashSet<String>,
		orphaned_date: Option<DateTime<Utc>>,
	) -> Result<usize, Error> {
		let mut state = self.state.lock();
		let mut updated = 0;

		for product_id in product_ids {
			if let Some(mapping) = state.owner_products.get_mut(&key(owner, product_id)) {
				mapping.orphaned_date = orphaned_date;
				updated += 1;
			}
		}

		Ok(updated)
	}

	fn create(&self, row: OwnerProduct, flush: bool) -> Result<(), Error> {
		let mut state = self.state.lock();
		state.pending_owner_products.push(row);

		if flush {
			state.flush()?;
		}

		Ok(())
	}

	fn remove_owner_product_references(
		&self,
		owner: &Owner,
		uuids: &HashSet<Uuid>,
	) -> Result<usize, Error> {
		let mut state = self.state.lock();
		let before = state.owner_products.len();

		state.owner_products.retain(|(owner_id, _), mapping| {
			*owner_id != owner.id || !uuids.contains(&mapping.product_uuid)
		});

		Ok(before - state.owner_products.len())
	}

	fn update_owner_product_references(
		&self,
		owner: &Owner,
		uuid_map: &HashMap<Uuid, Uuid>,
	) -> Result<usize, Error> {
		let mut state = self.state.lock();
		let mut updated = 0;

		for ((owner_id, _), mapping) in &mut state.owner_products {
			if *owner_id != owner.id {
				continue;
			}

			if let Some(uuid) = uuid_map.get(&mapping.product_uuid) {
				mapping.product_uuid = *uuid;
				updated += 1;
			}
		}

		Ok(updated)
	}

	fn rebuild_owner_product_mapping(
		&self,
		owner: &Owner,
		mapping: &HashMap<String, Uuid>,
	) -> Result<(), Error> {
		let mut state = self.state.lock();

		let mut orphaned_dates = HashMap::new();
		state.owner_products.retain(|(owner_id, product_id), row| {
			if *owner_id != owner.id {
				return true;
			}

			orphaned_dates.insert(product_id.clone(), row.orphaned_date);
			false
		});

		for (product_id, uuid) in mapping {
			state.owner_products.insert(
				key(owner, product_id),
				ProductMapping {
					owner: owner.clone(),
					product_uuid: *uuid,
					orphaned_date: orphaned_dates.get(product_id).copied().flatten(),
				},
			);
		}

		Ok(())
	}

	fn flush(&self) -> Result<(), Error> {
		self.state.lock().flush()
	}
}

impl PoolCurator for MemoryStore {
	fn pools_by_owner(&self, owner: &Owner) -> Result<Vec<Pool>, Error> {
		Ok(self
			.state
			.lock()
			.pools
			.get(&owner.id)
			.cloned()
			.unwrap_or_default())
	}
}
