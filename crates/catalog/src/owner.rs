use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The organization scoping a refresh and every join row it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner {
	pub id: Uuid,
	pub key: String,
}

impl Owner {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			key: key.into(),
		}
	}
}

impl fmt::Display for Owner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<key='{}'>", self.key)
	}
}

/// Join row mapping a product, by business ID, to the persisted row an owner uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProduct {
	pub owner: Owner,
	pub product_id: String,
	pub product_uuid: Uuid,
	/// Set when the product was first found orphaned, for products kept through a grace period.
	pub orphaned_date: Option<DateTime<Utc>>,
}

impl OwnerProduct {
	#[must_use]
	pub fn new(owner: Owner, product_id: impl Into<String>, product_uuid: Uuid) -> Self {
		Self {
			owner,
			product_id: product_id.into(),
			product_uuid,
			orphaned_date: None,
		}
	}
}

/// Join row mapping a content, by business ID, to the persisted row an owner uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContent {
	pub owner: Owner,
	pub content_id: String,
	pub content_uuid: Uuid,
}

impl OwnerContent {
	#[must_use]
	pub fn new(owner: Owner, content_id: impl Into<String>, content_uuid: Uuid) -> Self {
		Self {
			owner,
			content_id: content_id.into(),
			content_uuid,
		}
	}
}
