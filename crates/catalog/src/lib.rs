//!
//! # Entitlement Catalog Model
//!
//! Entity types shared by the refresh engine and its persistence collaborators.
//!
//! Every catalog entity comes in two shapes:
//! - the *local* entity ([`Product`], [`Content`], [`Pool`]), as persisted for one or more owners;
//! - the *imported* entity ([`ProductInfo`], [`ContentInfo`], [`SubscriptionInfo`]), as described
//!   by the upstream source for a refresh. Imported fields are optional, an absent field meaning
//!   "no opinion" rather than "clear this value".
//!
//! Local entities can compute an [`EntityVersion`], a structural fingerprint over their semantically
//! meaningful fields which is used to share one persisted row between every owner that ends up with
//! an equivalent entity.

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

use std::fmt::Debug;

use uuid::Uuid;

mod content;
mod owner;
mod pool;
mod product;
mod version;

pub use content::{Content, ContentInfo};
pub use owner::{Owner, OwnerContent, OwnerProduct};
pub use pool::{Pool, SubscriptionInfo};
pub use product::{
	Branding, BrandingInfo, ChildRef, Product, ProductContent, ProductContentInfo, ProductInfo,
};
pub use version::EntityVersion;

/// A locally persisted catalog entity.
pub trait Entity: Clone + Debug {
	/// The business ID, stable across owners and upstream imports.
	fn entity_id(&self) -> &str;

	/// The storage surrogate key, if this entity has been persisted.
	fn uuid(&self) -> Option<Uuid>;

	/// Whether the entity is managed by the upstream import pipeline, making it
	/// eligible for automatic pruning. Custom entities are never locked.
	fn is_locked(&self) -> bool;

	/// Structural fingerprint of the entity's semantic fields.
	fn entity_version(&self) -> EntityVersion;
}

/// An entity as described by the upstream source of a refresh.
pub trait EntityInfo: Clone + Debug + PartialEq {
	fn entity_id(&self) -> &str;
}

/// Checks if an incoming optional string would change the stored value.
///
/// With `treat_empty_as_absent`, an incoming empty string is equal to a stored
/// absent value, as some fields store empty and absent values interchangeably.
pub(crate) fn has_value_changed(
	existing: Option<&str>,
	incoming: Option<&str>,
	treat_empty_as_absent: bool,
) -> bool {
	incoming.is_some_and(|incoming| {
		!(Some(incoming) == existing || (treat_empty_as_absent && existing.is_none() && incoming.is_empty()))
	})
}

/// Normalizes fields that store empty and absent values interchangeably.
pub(crate) fn non_empty(value: Option<&String>) -> Option<&str> {
	value.map(String::as_str).filter(|value| !value.is_empty())
}
