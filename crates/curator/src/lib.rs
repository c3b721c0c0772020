//!
//! # Catalog Curators
//!
//! Persistence collaborators of the catalog refresh. Each curator covers one table family:
//! the entity rows themselves ([`ProductCurator`], [`ContentCurator`]) and the owner-scoped
//! join rows mapping business IDs to entity rows ([`OwnerProductCurator`],
//! [`OwnerContentCurator`]).
//!
//! Entity writes take effect immediately. Join row inserts may be deferred until the next
//! `flush`, which lets callers batch them.
//!
//! [`MemoryStore`] implements every curator in memory.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use ec_catalog::{Content, EntityVersion, Owner, OwnerContent, OwnerProduct, Pool, Product};

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

mod error;
mod memory;

pub use error::Error;
pub use memory::MemoryStore;

pub trait ContentCurator: Send + Sync {
	/// Inserts `content` if it has no UUID, updates its row otherwise. Stores the entity version.
	fn save_or_update(&self, content: Content) -> Result<Content, Error>;

	fn contents_by_uuids(&self, uuids: &HashSet<Uuid>) -> Result<Vec<Content>, Error>;

	/// Every persisted content with one of the given business IDs, across all owners.
	fn contents_by_ids(&self, ids: &HashSet<String>) -> Result<HashMap<String, Vec<Content>>, Error>;

	/// Stops the given content from being matched by its stored version.
	fn clear_entity_version(&self, content: &Content) -> Result<(), Error>;
}

pub trait OwnerContentCurator: Send + Sync {
	fn content_by_owner(&self, owner: &Owner) -> Result<Vec<Content>, Error>;

	fn save_all(&self, rows: Vec<OwnerContent>, flush: bool) -> Result<(), Error>;

	fn remove_owner_content_references(
		&self,
		owner: &Owner,
		uuids: &HashSet<Uuid>,
	) -> Result<usize, Error>;

	/// Repoints every join row of `owner` from each key UUID to its value UUID.
	fn update_owner_content_references(
		&self,
		owner: &Owner,
		uuid_map: &HashMap<Uuid, Uuid>,
	) -> Result<usize, Error>;

	/// Replaces every join row of `owner` with the given business ID to UUID mapping.
	fn rebuild_owner_content_mapping(
		&self,
		owner: &Owner,
		mapping: &HashMap<String, Uuid>,
	) -> Result<(), Error>;

	fn flush(&self) -> Result<(), Error>;
}

pub trait ProductCurator: Send + Sync {
	/// Inserts a product which must not have a UUID yet. Stores the entity version.
	fn create(&self, product: Product, flush: bool) -> Result<Product, Error>;

	fn products_by_uuids(&self, uuids: &HashSet<Uuid>) -> Result<Vec<Product>, Error>;
}

pub trait OwnerProductCurator: Send + Sync {
	fn products_by_owner(&self, owner: &Owner) -> Result<Vec<Product>, Error>;

	/// Every persisted product stored with one of the given versions, across all owners,
	/// grouped by business ID.
	fn products_by_versions(
		&self,
		versions: &HashSet<EntityVersion>,
	) -> Result<HashMap<String, Vec<Product>>, Error>;

	fn clear_product_entity_version(&self, product: &Product) -> Result<(), Error>;

	fn owner_product(&self, owner: &Owner, product_id: &str) -> Result<Option<OwnerProduct>, Error>;

	/// Orphaned dates of the given products, for every one of them mapped to `owner`.
	fn owner_product_orphaned_dates(
		&self,
		owner: &Owner,
		product_ids: &HashSet<String>,
	) -> Result<HashMap<String, Option<DateTime<Utc>>>, Error>;

	fn update_owner_product_orphaned_dates(
		&self,
		owner: &Owner,
		product_ids: &HashSet<String>,
		orphaned_date: Option<DateTime<Utc>>,
	) -> Result<usize, Error>;

	fn create(&self, row: OwnerProduct, flush: bool) -> Result<(), Error>;

	fn remove_owner_product_references(
		&self,
		owner: &Owner,
		uuids: &HashSet<Uuid>,
	) -> Result<usize, Error>;

	/// Repoints every join row of `owner` from each key UUID to its value UUID.
	fn update_owner_product_references(
		&self,
		owner: &Owner,
		uuid_map: &HashMap<Uuid, Uuid>,
	) -> Result<usize, Error>;

	/// Replaces every join row of `owner` with the given business ID to UUID mapping.
	fn rebuild_owner_product_mapping(
		&self,
		owner: &Owner,
		mapping: &HashMap<String, Uuid>,
	) -> Result<(), Error>;

	fn flush(&self) -> Result<(), Error>;
}

pub trait PoolCurator: Send + Sync {
	fn pools_by_owner(&self, owner: &Owner) -> Result<Vec<Pool>, Error>;
}

/// Every curator a refresh needs.
#[derive(Clone)]
pub struct Curators {
	pub pools: Arc<dyn PoolCurator>,
	pub products: Arc<dyn ProductCurator>,
	pub owner_products: Arc<dyn OwnerProductCurator>,
	pub contents: Arc<dyn ContentCurator>,
	pub owner_contents: Arc<dyn OwnerContentCurator>,
}

impl Curators {
	/// Uses a single store for every curator.
	pub fn from_store<S>(store: Arc<S>) -> Self
	where
		S: PoolCurator
			+ ProductCurator
			+ OwnerProductCurator
			+ ContentCurator
			+ OwnerContentCurator
			+ 'static,
	{
		Self {
			pools: store.clone(),
			products: store.clone(),
			owner_products: store.clone(),
			contents: store.clone(),
			owner_contents: store,
		}
	}
}
