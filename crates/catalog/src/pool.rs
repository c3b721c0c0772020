use crate::{version::VersionHasher, Entity, EntityInfo, EntityVersion, ProductInfo};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscription pool. Only mapped into a refresh so its product subtree has a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
	pub uuid: Option<Uuid>,
	pub id: String,
	pub product_id: Option<String>,
	pub product_uuid: Option<Uuid>,
}

/// An upstream subscription, from which a pool is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
	pub id: String,
	pub product: Option<ProductInfo>,
}

impl Pool {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}
}

impl Entity for Pool {
	fn entity_id(&self) -> &str {
		&self.id
	}

	fn uuid(&self) -> Option<Uuid> {
		self.uuid
	}

	fn is_locked(&self) -> bool {
		true
	}

	fn entity_version(&self) -> EntityVersion {
		VersionHasher::new("pool")
			.str(&self.id)
			.opt_str(self.product_id.as_deref())
			.finish()
	}
}

impl SubscriptionInfo {
	pub fn new(id: impl Into<String>, product: Option<ProductInfo>) -> Self {
		Self {
			id: id.into(),
			product,
		}
	}
}

impl EntityInfo for SubscriptionInfo {
	fn entity_id(&self) -> &str {
		&self.id
	}
}
