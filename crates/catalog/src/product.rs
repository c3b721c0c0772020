use crate::{version::VersionHasher, ContentInfo, Entity, EntityInfo, EntityVersion};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product's reference to a child entity.
///
/// Children are referenced by business ID, along with the storage row and version they
/// resolved to. Parents hash their children by `(id, version)` only, so a child resolving
/// to a deduplicated row never changes its parent's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
	pub id: String,
	pub uuid: Option<Uuid>,
	pub version: EntityVersion,
}

impl ChildRef {
	pub fn of(entity: &impl Entity) -> Self {
		Self {
			id: entity.entity_id().to_string(),
			uuid: entity.uuid(),
			version: entity.entity_version(),
		}
	}

	fn is_equivalent_to(&self, other: &Self) -> bool {
		self.id == other.id && self.version == other.version
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductContent {
	pub content: ChildRef,
	pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Branding {
	pub product_id: String,
	pub name: String,
	pub branding_type: String,
}

pub type BrandingInfo = Branding;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
	pub uuid: Option<Uuid>,
	pub id: String,
	pub name: Option<String>,
	pub multiplier: Option<i64>,
	pub attributes: BTreeMap<String, String>,
	pub dependent_product_ids: BTreeSet<String>,
	pub branding: BTreeSet<Branding>,
	pub derived_product: Option<ChildRef>,
	/// Keyed by the provided product's business ID.
	pub provided_products: BTreeMap<String, ChildRef>,
	/// Keyed by the content's business ID.
	pub product_content: BTreeMap<String, ProductContent>,
	pub locked: bool,
	pub persisted_version: Option<EntityVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
	pub id: String,
	pub name: Option<String>,
	pub multiplier: Option<i64>,
	pub attributes: Option<BTreeMap<String, String>>,
	pub dependent_product_ids: Option<BTreeSet<String>>,
	pub branding: Option<BTreeSet<BrandingInfo>>,
	pub derived_product: Option<Box<ProductInfo>>,
	pub provided_products: Option<Vec<ProductInfo>>,
	pub product_content: Option<Vec<ProductContentInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductContentInfo {
	/// Upstream data may carry a join without its content, which can't be refreshed.
	pub content: Option<ContentInfo>,
	pub enabled: bool,
}

impl Product {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}

	/// Checks if applying `update` would change this product, ignoring identifier fields.
	///
	/// Children are only compared by reference, never by content. A child whose own fields
	/// changed shows up as a changed child node instead.
	#[must_use]
	pub fn is_changed_by(&self, update: &ProductInfo) -> bool {
		if update.name.as_ref().is_some_and(|name| Some(name) != self.name.as_ref())
			|| update
				.multiplier
				.is_some_and(|multiplier| Some(multiplier) != self.multiplier)
			|| update
				.attributes
				.as_ref()
				.is_some_and(|attributes| attributes != &self.attributes)
			|| update
				.dependent_product_ids
				.as_ref()
				.is_some_and(|ids| ids != &self.dependent_product_ids)
		{
			return true;
		}

		if let Some(product_content) = &update.product_content {
			// Later duplicates win, like the local map does
			let incoming = product_content
				.iter()
				.filter_map(|pc| pc.content.as_ref().map(|content| (content.id.as_str(), pc.enabled)))
				.collect::<HashMap<_, _>>();

			let local = self
				.product_content
				.iter()
				.map(|(id, pc)| (id.as_str(), pc.enabled))
				.collect::<HashMap<_, _>>();

			if incoming != local {
				return true;
			}
		}

		// An absent derived product is not "no opinion", it removes the local one
		match (&update.derived_product, &self.derived_product) {
			(Some(incoming), Some(local)) if incoming.id != local.id => return true,
			(Some(_), None) | (None, Some(_)) => return true,
			_ => {}
		}

		if let Some(provided) = &update.provided_products {
			let incoming = provided.iter().map(|p| p.id.as_str()).collect::<BTreeSet<_>>();
			let local = self
				.provided_products
				.keys()
				.map(String::as_str)
				.collect::<BTreeSet<_>>();

			if incoming != local {
				return true;
			}
		}

		update
			.branding
			.as_ref()
			.is_some_and(|branding| branding != &self.branding)
	}

	/// Copies every base field present on `update` onto this product.
	///
	/// Children references are resolved against the node graph and must be set separately.
	pub fn apply_changes(&mut self, update: &ProductInfo) {
		if let Some(name) = &update.name {
			self.name = Some(name.clone());
		}

		if let Some(multiplier) = update.multiplier {
			self.multiplier = Some(multiplier);
		}

		if let Some(attributes) = &update.attributes {
			self.attributes.clone_from(attributes);
		}

		if let Some(ids) = &update.dependent_product_ids {
			self.dependent_product_ids.clone_from(ids);
		}

		if let Some(branding) = &update.branding {
			self.branding.clone_from(branding);
		}
	}

	/// Field by field comparison of everything the entity version covers.
	#[must_use]
	pub fn is_equivalent_to(&self, other: &Self) -> bool {
		fn same_children<'a>(
			a: impl ExactSizeIterator<Item = (&'a ChildRef, bool)>,
			b: impl ExactSizeIterator<Item = (&'a ChildRef, bool)>,
		) -> bool {
			a.len() == b.len()
				&& a.zip(b).all(|((a, a_enabled), (b, b_enabled))| {
					a.is_equivalent_to(b) && a_enabled == b_enabled
				})
		}

		let derived_equivalent = match (&self.derived_product, &other.derived_product) {
			(Some(a), Some(b)) => a.is_equivalent_to(b),
			(None, None) => true,
			_ => false,
		};

		let provided_equivalent = same_children(
			self.provided_products.values().map(|child| (child, true)),
			other.provided_products.values().map(|child| (child, true)),
		);

		let content_equivalent = same_children(
			self.product_content.values().map(|pc| (&pc.content, pc.enabled)),
			other.product_content.values().map(|pc| (&pc.content, pc.enabled)),
		);

		self.id == other.id
			&& self.name == other.name
			&& self.multiplier == other.multiplier
			&& self.attributes == other.attributes
			&& self.dependent_product_ids == other.dependent_product_ids
			&& self.branding == other.branding
			&& derived_equivalent
			&& provided_equivalent
			&& content_equivalent
	}
}

impl Entity for Product {
	fn entity_id(&self) -> &str {
		&self.id
	}

	fn uuid(&self) -> Option<Uuid> {
		self.uuid
	}

	fn is_locked(&self) -> bool {
		self.locked
	}

	fn entity_version(&self) -> EntityVersion {
		let mut hasher = VersionHasher::new("product");

		hasher
			.str(&self.id)
			.opt_str(self.name.as_deref())
			.opt_i64(self.multiplier)
			.seq(self.attributes.iter(), |hasher, (key, value)| {
				hasher.str(key).str(value);
			})
			.seq(self.dependent_product_ids.iter(), |hasher, id| {
				hasher.str(id);
			})
			.seq(self.branding.iter(), |hasher, branding| {
				hasher
					.str(&branding.product_id)
					.str(&branding.name)
					.str(&branding.branding_type);
			})
			.seq(self.derived_product.iter(), |hasher, child| {
				hasher.str(&child.id).version(child.version);
			})
			.seq(self.provided_products.values(), |hasher, child| {
				hasher.str(&child.id).version(child.version);
			})
			.seq(self.product_content.values(), |hasher, pc| {
				hasher
					.str(&pc.content.id)
					.version(pc.content.version)
					.bool(pc.enabled);
			});

		hasher.finish()
	}
}

impl ProductInfo {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}
}

impl EntityInfo for ProductInfo {
	fn entity_id(&self) -> &str {
		&self.id
	}
}

impl ProductContentInfo {
	#[must_use]
	pub const fn new(content: ContentInfo, enabled: bool) -> Self {
		Self {
			content: Some(content),
			enabled,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::Content;

	use pretty_assertions::assert_eq;

	fn child(id: &str) -> ChildRef {
		ChildRef::of(&Content::new(id))
	}

	fn product() -> Product {
		Product {
			name: Some("server".to_string()),
			attributes: BTreeMap::from([("arch".to_string(), "x86_64".to_string())]),
			provided_products: BTreeMap::from([(
				"p2".to_string(),
				ChildRef::of(&Product::new("p2")),
			)]),
			product_content: BTreeMap::from([(
				"c1".to_string(),
				ProductContent {
					content: child("c1"),
					enabled: true,
				},
			)]),
			locked: true,
			..Product::new("p1")
		}
	}

	#[test]
	fn empty_update_only_changes_derived_product() {
		assert!(!product().is_changed_by(&ProductInfo::new("p1")));

		let mut with_derived = product();
		with_derived.derived_product = Some(ChildRef::of(&Product::new("d1")));
		assert!(with_derived.is_changed_by(&ProductInfo::new("p1")));
	}

	#[test]
	fn content_enablement_is_a_change() {
		let update = ProductInfo {
			product_content: Some(vec![ProductContentInfo::new(ContentInfo::new("c1"), false)]),
			..ProductInfo::new("p1")
		};
		assert!(product().is_changed_by(&update));

		let update = ProductInfo {
			product_content: Some(vec![ProductContentInfo::new(ContentInfo::new("c1"), true)]),
			..ProductInfo::new("p1")
		};
		assert!(!product().is_changed_by(&update));
	}

	#[test]
	fn provided_products_are_compared_by_id() {
		let update = ProductInfo {
			provided_products: Some(vec![ProductInfo {
				name: Some("renamed".to_string()),
				..ProductInfo::new("p2")
			}]),
			..ProductInfo::new("p1")
		};
		assert!(!product().is_changed_by(&update));

		let update = ProductInfo {
			provided_products: Some(vec![]),
			..ProductInfo::new("p1")
		};
		assert!(product().is_changed_by(&update));
	}

	#[test]
	fn apply_changes_keeps_children() {
		let mut merged = product();
		merged.apply_changes(&ProductInfo {
			name: Some("workstation".to_string()),
			attributes: Some(BTreeMap::new()),
			..ProductInfo::new("p1")
		});

		assert_eq!(merged.name.as_deref(), Some("workstation"));
		assert!(merged.attributes.is_empty());
		assert_eq!(merged.product_content, product().product_content);
	}

	#[test]
	fn version_ignores_child_storage_rows() {
		let mut other = product();
		for child in other.provided_products.values_mut() {
			child.uuid = Some(Uuid::new_v4());
		}
		other.uuid = Some(Uuid::new_v4());

		assert_eq!(product().entity_version(), other.entity_version());
		assert!(product().is_equivalent_to(&other));
	}

	#[test]
	fn version_tracks_child_versions() {
		let mut other = product();
		other.product_content.insert(
			"c1".to_string(),
			ProductContent {
				content: ChildRef::of(&Content {
					name: Some("changed".to_string()),
					..Content::new("c1")
				}),
				enabled: true,
			},
		);

		assert_ne!(product().entity_version(), other.entity_version());
		assert!(!product().is_equivalent_to(&other));
	}
}
