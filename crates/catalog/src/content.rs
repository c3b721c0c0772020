use crate::{has_value_changed, non_empty, version::VersionHasher, Entity, EntityInfo, EntityVersion};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A content set (repository) as persisted locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
	pub uuid: Option<Uuid>,
	pub id: String,
	pub content_type: Option<String>,
	pub label: Option<String>,
	pub name: Option<String>,
	pub vendor: Option<String>,
	pub content_url: Option<String>,
	pub required_tags: Option<String>,
	pub release_version: Option<String>,
	pub gpg_url: Option<String>,
	pub arches: Option<String>,
	pub metadata_expiration: Option<i64>,
	pub modified_product_ids: BTreeSet<String>,
	pub locked: bool,
	/// Version stored alongside the row when it was persisted, if still trusted.
	pub persisted_version: Option<EntityVersion>,
}

/// A content set as described by the upstream source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
	pub id: String,
	pub content_type: Option<String>,
	pub label: Option<String>,
	pub name: Option<String>,
	pub vendor: Option<String>,
	pub content_url: Option<String>,
	pub required_tags: Option<String>,
	pub release_version: Option<String>,
	pub gpg_url: Option<String>,
	pub arches: Option<String>,
	pub metadata_expiration: Option<i64>,
	pub modified_product_ids: Option<BTreeSet<String>>,
}

impl Content {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}

	/// Checks if applying `update` would change this content, ignoring identifier fields.
	#[must_use]
	pub fn is_changed_by(&self, update: &ContentInfo) -> bool {
		let expiration_changed = update
			.metadata_expiration
			.is_some_and(|expiration| Some(expiration) != self.metadata_expiration);

		// These fields store empty and absent values interchangeably
		let normalized_changed = [
			(&self.arches, &update.arches),
			(&self.content_url, &update.content_url),
			(&self.gpg_url, &update.gpg_url),
			(&self.release_version, &update.release_version),
			(&self.required_tags, &update.required_tags),
		]
		.into_iter()
		.any(|(existing, incoming)| {
			has_value_changed(existing.as_deref(), incoming.as_deref(), true)
		});

		let modified_products_changed = update
			.modified_product_ids
			.as_ref()
			.is_some_and(|ids| ids != &self.modified_product_ids);

		has_value_changed(self.content_type.as_deref(), update.content_type.as_deref(), false)
			|| has_value_changed(self.label.as_deref(), update.label.as_deref(), false)
			|| has_value_changed(self.name.as_deref(), update.name.as_deref(), false)
			|| has_value_changed(self.vendor.as_deref(), update.vendor.as_deref(), false)
			|| expiration_changed
			|| normalized_changed
			|| modified_products_changed
	}

	/// Copies every field present on `update` onto this content. Absent fields are kept.
	pub fn apply_changes(&mut self, update: &ContentInfo) {
		fn copy(target: &mut Option<String>, source: Option<&String>) {
			if let Some(value) = source {
				*target = Some(value.clone());
			}
		}

		fn copy_non_empty(target: &mut Option<String>, source: Option<&String>) {
			if let Some(value) = source {
				*target = (!value.is_empty()).then(|| value.clone());
			}
		}

		copy(&mut self.content_type, update.content_type.as_ref());
		copy(&mut self.label, update.label.as_ref());
		copy(&mut self.name, update.name.as_ref());
		copy(&mut self.vendor, update.vendor.as_ref());
		copy_non_empty(&mut self.content_url, update.content_url.as_ref());
		copy_non_empty(&mut self.required_tags, update.required_tags.as_ref());
		copy_non_empty(&mut self.release_version, update.release_version.as_ref());
		copy_non_empty(&mut self.gpg_url, update.gpg_url.as_ref());
		copy_non_empty(&mut self.arches, update.arches.as_ref());

		if let Some(expiration) = update.metadata_expiration {
			self.metadata_expiration = Some(expiration);
		}

		if let Some(ids) = &update.modified_product_ids {
			self.modified_product_ids.clone_from(ids);
		}
	}

	/// Field by field comparison of everything the entity version covers.
	#[must_use]
	pub fn is_equivalent_to(&self, other: &Self) -> bool {
		self.id == other.id
			&& self.content_type == other.content_type
			&& self.label == other.label
			&& self.name == other.name
			&& self.vendor == other.vendor
			&& self.metadata_expiration == other.metadata_expiration
			&& non_empty(self.content_url.as_ref()) == non_empty(other.content_url.as_ref())
			&& non_empty(self.required_tags.as_ref()) == non_empty(other.required_tags.as_ref())
			&& non_empty(self.release_version.as_ref())
				== non_empty(other.release_version.as_ref())
			&& non_empty(self.gpg_url.as_ref()) == non_empty(other.gpg_url.as_ref())
			&& non_empty(self.arches.as_ref()) == non_empty(other.arches.as_ref())
			&& self.modified_product_ids == other.modified_product_ids
	}
}

impl Entity for Content {
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
		VersionHasher::new("content")
			.str(&self.id)
			.opt_str(self.content_type.as_deref())
			.opt_str(self.label.as_deref())
			.opt_str(self.name.as_deref())
			.opt_str(self.vendor.as_deref())
			.opt_str(non_empty(self.content_url.as_ref()))
			.opt_str(non_empty(self.required_tags.as_ref()))
			.opt_str(non_empty(self.release_version.as_ref()))
			.opt_str(non_empty(self.gpg_url.as_ref()))
			.opt_str(non_empty(self.arches.as_ref()))
			.opt_i64(self.metadata_expiration)
			.seq(self.modified_product_ids.iter(), |hasher, id| {
				hasher.str(id);
			})
			.finish()
	}
}

impl ContentInfo {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}
}

impl EntityInfo for ContentInfo {
	fn entity_id(&self) -> &str {
		&self.id
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn content() -> Content {
		Content {
			name: Some("foo".to_string()),
			label: Some("foo-label".to_string()),
			content_url: Some("/content/foo".to_string()),
			modified_product_ids: BTreeSet::from(["p1".to_string()]),
			locked: true,
			..Content::new("c1")
		}
	}

	#[test]
	fn identical_update_is_not_a_change() {
		let update = ContentInfo {
			name: Some("foo".to_string()),
			label: Some("foo-label".to_string()),
			content_url: Some("/content/foo".to_string()),
			modified_product_ids: Some(BTreeSet::from(["p1".to_string()])),
			..ContentInfo::new("c1")
		};

		assert!(!content().is_changed_by(&update));
		assert!(!content().is_changed_by(&ContentInfo::new("c1")));
	}

	#[test]
	fn field_difference_is_a_change() {
		let update = ContentInfo {
			name: Some("bar".to_string()),
			..ContentInfo::new("c1")
		};

		assert!(content().is_changed_by(&update));
	}

	#[test]
	fn empty_string_matches_absent_for_url_like_fields() {
		let update = ContentInfo {
			gpg_url: Some(String::new()),
			arches: Some(String::new()),
			..ContentInfo::new("c1")
		};
		assert!(!content().is_changed_by(&update));

		let update = ContentInfo {
			vendor: Some(String::new()),
			..ContentInfo::new("c1")
		};
		assert!(content().is_changed_by(&update));
	}

	#[test]
	fn modified_product_ids_are_compared_as_sets() {
		let update = ContentInfo {
			modified_product_ids: Some(BTreeSet::new()),
			..ContentInfo::new("c1")
		};

		assert!(content().is_changed_by(&update));
	}

	#[test]
	fn apply_changes_keeps_absent_fields() {
		let mut merged = content();
		merged.apply_changes(&ContentInfo {
			name: Some("bar".to_string()),
			gpg_url: Some(String::new()),
			..ContentInfo::new("c1")
		});

		assert_eq!(merged.name.as_deref(), Some("bar"));
		assert_eq!(merged.label.as_deref(), Some("foo-label"));
		assert_eq!(merged.gpg_url, None);
	}

	#[test]
	fn version_ignores_storage_identity() {
		let mut other = content();
		other.uuid = Some(Uuid::new_v4());
		other.locked = false;
		other.persisted_version = Some(EntityVersion::new(7));

		assert_eq!(content().entity_version(), other.entity_version());
		assert!(content().is_equivalent_to(&other));
	}

	#[test]
	fn version_tracks_semantic_fields() {
		let mut other = content();
		other.vendor = Some("acme".to_string());

		assert_ne!(content().entity_version(), other.entity_version());
		assert!(!content().is_equivalent_to(&other));
	}

	#[test]
	fn version_treats_empty_url_as_absent() {
		let mut a = content();
		a.gpg_url = Some(String::new());

		assert_eq!(a.entity_version(), content().entity_version());
	}
}
