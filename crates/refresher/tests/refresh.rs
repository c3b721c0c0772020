use ec_catalog::{
	ContentInfo, Owner, Pool, Product, ProductContentInfo, ProductInfo, SubscriptionInfo,
};
use ec_curator::{Curators, MemoryStore, OwnerProductCurator};
use ec_refresher::{EntityState, RefreshConfig, RefreshResult, RefreshWorker};

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

fn content(id: &str, name: &str) -> ContentInfo {
	ContentInfo {
		name: Some(name.to_string()),
		content_url: Some(format!("/content/{id}")),
		..ContentInfo::new(id)
	}
}

fn product(id: &str, contents: Vec<ContentInfo>) -> ProductInfo {
	ProductInfo {
		name: Some(format!("Product {id}")),
		product_content: Some(
			contents
				.into_iter()
				.map(|content| ProductContentInfo::new(content, true))
				.collect(),
		),
		..ProductInfo::new(id)
	}
}

fn subscription(id: &str, product: ProductInfo) -> SubscriptionInfo {
	SubscriptionInfo::new(id, Some(product))
}

fn refresh_with(
	store: &Arc<MemoryStore>,
	owner: &Owner,
	config: RefreshConfig,
	subscriptions: Vec<SubscriptionInfo>,
) -> RefreshResult {
	let mut worker = RefreshWorker::new(Curators::from_store(Arc::clone(store)), config);
	worker.add_subscriptions(subscriptions).unwrap();
	worker.execute(owner).unwrap()
}

fn refresh(
	store: &Arc<MemoryStore>,
	owner: &Owner,
	subscriptions: Vec<SubscriptionInfo>,
) -> RefreshResult {
	refresh_with(store, owner, RefreshConfig::default(), subscriptions)
}

fn catalog() -> Vec<SubscriptionInfo> {
	vec![subscription(
		"s1",
		product("p1", vec![content("c1", "Base"), content("c2", "Extras")]),
	)]
}

#[test]
#[traced_test]
fn new_catalog_is_created() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");

	let result = refresh(&store, &owner, catalog());

	assert_eq!(result.products().state("p1"), Some(EntityState::Created));
	assert_eq!(result.contents().count(EntityState::Created), 2);

	let p1 = result.products().entity("p1").unwrap();
	assert!(p1.locked);
	assert_eq!(store.owner_product_uuid(&owner, "p1"), p1.uuid);

	let c1 = result.contents().entity("c1").unwrap();
	assert_eq!(store.owner_content_uuid(&owner, "c1"), c1.uuid);
	assert_eq!(
		store.product(p1.uuid.unwrap()).unwrap().product_content["c1"].content.uuid,
		c1.uuid
	);
	assert!(logs_contain("Refresh complete"));
}

#[test]
fn identical_catalog_leaves_everything_unchanged() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");

	let created = refresh(&store, &owner, catalog());
	let result = refresh(&store, &owner, catalog());

	assert_eq!(result.products().count(EntityState::Unchanged), 1);
	assert_eq!(result.contents().count(EntityState::Unchanged), 2);
	assert_eq!(store.product_count(), 1);
	assert_eq!(store.content_count(), 2);
	assert_eq!(
		result.products().entity("p1").map(|product| product.uuid),
		created.products().entity("p1").map(|product| product.uuid)
	);
}

#[test]
fn content_changes_propagate_to_parent_products() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");

	let created = refresh(&store, &owner, catalog());
	let old_c1 = created.contents().entity("c1").unwrap().uuid;
	let old_p1 = created.products().entity("p1").unwrap().uuid;

	let result = refresh(
		&store,
		&owner,
		vec![subscription(
			"s1",
			product("p1", vec![content("c1", "Renamed"), content("c2", "Extras")]),
		)],
	);

	assert_eq!(result.contents().state("c1"), Some(EntityState::Updated));
	assert_eq!(result.contents().state("c2"), Some(EntityState::Unchanged));
	assert_eq!(result.products().state("p1"), Some(EntityState::Updated));

	let c1 = result.contents().entity("c1").unwrap();
	let p1 = result.products().entity("p1").unwrap();
	assert_eq!(c1.name.as_deref(), Some("Renamed"));
	assert_ne!(c1.uuid, old_c1);
	assert_ne!(p1.uuid, old_p1);

	assert_eq!(store.owner_content_uuid(&owner, "c1"), c1.uuid);
	assert_eq!(store.owner_product_uuid(&owner, "p1"), p1.uuid);
	assert_eq!(p1.product_content["c1"].content.uuid, c1.uuid);

	// The previous rows stay in place for whoever else uses them
	assert!(store.content(old_c1.unwrap()).is_some());
}

#[test]
fn product_field_changes_update_the_product_only() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	refresh(&store, &owner, catalog());

	let mut changed = product("p1", vec![content("c1", "Base"), content("c2", "Extras")]);
	changed.multiplier = Some(10);

	let result = refresh(&store, &owner, vec![subscription("s1", changed)]);

	assert_eq!(result.products().state("p1"), Some(EntityState::Updated));
	assert_eq!(result.contents().count(EntityState::Unchanged), 2);
	assert_eq!(result.products().entity("p1").unwrap().multiplier, Some(10));
}

#[test]
fn equivalent_entities_are_shared_between_owners() {
	let store = Arc::new(MemoryStore::new());
	let acme = Owner::new("acme");
	let globex = Owner::new("globex");

	let first = refresh(&store, &acme, catalog());
	let second = refresh(&store, &globex, catalog());

	assert_eq!(second.products().state("p1"), Some(EntityState::Created));
	assert_eq!(second.contents().count(EntityState::Created), 2);

	assert_eq!(store.product_count(), 1);
	assert_eq!(store.content_count(), 2);
	assert_eq!(
		store.owner_product_uuid(&globex, "p1"),
		first.products().entity("p1").unwrap().uuid
	);
	assert_eq!(
		store.owner_content_uuid(&globex, "c2"),
		store.owner_content_uuid(&acme, "c2")
	);
}

#[test]
fn orphaned_products_are_pruned_with_their_content() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	refresh(&store, &owner, catalog());

	let result = refresh(&store, &owner, Vec::new());

	assert_eq!(result.products().state("p1"), Some(EntityState::Deleted));
	assert_eq!(result.contents().count(EntityState::Deleted), 2);
	assert_eq!(store.owner_product_uuid(&owner, "p1"), None);
	assert_eq!(store.owner_content_uuid(&owner, "c1"), None);
	assert_eq!(store.product_count(), 1);
}

#[test]
fn content_still_used_by_a_kept_product_survives() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	refresh(
		&store,
		&owner,
		vec![
			subscription("s1", product("p1", vec![content("c1", "Base")])),
			subscription("s2", product("p2", vec![content("c1", "Base")])),
		],
	);

	let result = refresh(
		&store,
		&owner,
		vec![subscription("s2", product("p2", vec![content("c1", "Base")]))],
	);

	assert_eq!(result.products().state("p1"), Some(EntityState::Deleted));
	assert_eq!(result.products().state("p2"), Some(EntityState::Unchanged));
	assert_eq!(result.contents().state("c1"), Some(EntityState::Unchanged));
	assert!(store.owner_content_uuid(&owner, "c1").is_some());
}

#[test]
fn custom_products_are_never_pruned() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	store
		.seed_product(
			&owner,
			Product {
				name: Some("Custom".to_string()),
				..Product::new("custom")
			},
		)
		.unwrap();

	let result = refresh(&store, &owner, Vec::new());

	assert_eq!(result.products().state("custom"), Some(EntityState::Unchanged));
	assert!(store.owner_product_uuid(&owner, "custom").is_some());
}

#[test]
fn pools_are_skipped_and_keep_their_products() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let created = refresh(&store, &owner, catalog());
	let p1 = created.products().entity("p1").unwrap();

	store.seed_pool(
		&owner,
		Pool {
			product_id: Some("p1".to_string()),
			product_uuid: p1.uuid,
			..Pool::new("pool-1")
		},
	);

	let result = refresh(&store, &owner, Vec::new());

	assert_eq!(result.products().state("p1"), Some(EntityState::Unchanged));
	assert_eq!(result.contents().count(EntityState::Unchanged), 2);
	assert_eq!(store.owner_product_uuid(&owner, "p1"), p1.uuid);
}

#[test]
fn orphans_are_kept_through_the_grace_period() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let config = RefreshConfig::default().with_grace_period(7);
	refresh_with(&store, &owner, config.clone(), catalog());

	let orphaned_date = || {
		store
			.owner_product(&owner, "p1")
			.unwrap()
			.and_then(|row| row.orphaned_date)
	};

	// First refresh without the product flags it
	let result = refresh_with(&store, &owner, config.clone(), Vec::new());
	assert_eq!(result.products().state("p1"), Some(EntityState::Unchanged));
	assert_eq!(result.contents().count(EntityState::Unchanged), 2);
	assert!(orphaned_date().is_some());

	// Coming back upstream clears the flag
	refresh_with(&store, &owner, config.clone(), catalog());
	assert_eq!(orphaned_date(), None);

	// Orphaned for longer than the grace period
	refresh_with(&store, &owner, config.clone(), Vec::new());
	store.set_orphaned_date(&owner, "p1", Some(Utc::now() - Duration::days(8)));

	let result = refresh_with(&store, &owner, config, Vec::new());
	assert_eq!(result.products().state("p1"), Some(EntityState::Deleted));
	assert_eq!(result.contents().count(EntityState::Deleted), 2);
	assert_eq!(store.owner_product_uuid(&owner, "p1"), None);
}

#[test]
fn negative_grace_period_keeps_orphans_forever() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let config = RefreshConfig::default().with_grace_period(-1);
	refresh_with(&store, &owner, config.clone(), catalog());

	let result = refresh_with(&store, &owner, config, Vec::new());

	assert_eq!(result.products().state("p1"), Some(EntityState::Unchanged));
	assert!(store.owner_product_uuid(&owner, "p1").is_some());
}

#[test]
fn child_products_are_refreshed_with_their_parent() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");

	let mut parent = product("parent", vec![content("c1", "Base")]);
	parent.derived_product = Some(Box::new(product("derived", Vec::new())));
	parent.provided_products = Some(vec![product("provided", vec![content("c2", "Extras")])]);

	let created = refresh(&store, &owner, vec![subscription("s1", parent.clone())]);
	assert_eq!(created.products().count(EntityState::Created), 3);

	let derived = created.products().entity("derived").unwrap();
	let stored_parent = created.products().entity("parent").unwrap();
	assert_eq!(
		stored_parent.derived_product.as_ref().and_then(|child| child.uuid),
		derived.uuid
	);

	// Dropping the derived product upstream removes the reference and the orphan
	parent.derived_product = None;
	let result = refresh(&store, &owner, vec![subscription("s1", parent)]);

	assert_eq!(result.products().state("parent"), Some(EntityState::Updated));
	assert_eq!(result.products().state("derived"), Some(EntityState::Deleted));
	assert_eq!(result.products().state("provided"), Some(EntityState::Unchanged));
	assert_eq!(result.products().entity("parent").unwrap().derived_product, None);
}

#[test]
#[traced_test]
fn dirty_mappings_are_rebuilt() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let other = Owner::new("globex");

	// Referenced by one of the owner's pools, but never mapped to the owner
	let unmapped = store
		.seed_product(
			&other,
			Product {
				locked: true,
				..Product::new("p9")
			},
		)
		.unwrap();

	store.seed_pool(
		&owner,
		Pool {
			product_id: Some("p9".to_string()),
			product_uuid: unmapped.uuid,
			..Pool::new("pool-9")
		},
	);

	let result = refresh(&store, &owner, Vec::new());

	assert_eq!(result.products().state("p9"), Some(EntityState::Unchanged));
	assert_eq!(store.owner_product_uuid(&owner, "p9"), unmapped.uuid);
	assert!(logs_contain("dirty product mappings"));
}

#[test]
fn negative_grace_period_clears_orphaned_dates() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let grace = RefreshConfig::default().with_grace_period(7);
	refresh_with(&store, &owner, grace.clone(), catalog());
	refresh_with(&store, &owner, grace, Vec::new());

	let orphaned_date = || {
		store
			.owner_product(&owner, "p1")
			.unwrap()
			.and_then(|row| row.orphaned_date)
	};
	assert!(orphaned_date().is_some());

	let result = refresh_with(
		&store,
		&owner,
		RefreshConfig::default().with_grace_period(-1),
		Vec::new(),
	);

	assert_eq!(result.products().state("p1"), Some(EntityState::Unchanged));
	assert_eq!(orphaned_date(), None);
}

#[test]
fn imported_root_products_are_never_deleted() {
	let store = Arc::new(MemoryStore::new());
	let owner = Owner::new("acme");
	let mut worker = RefreshWorker::new(
		Curators::from_store(Arc::clone(&store)),
		RefreshConfig::default(),
	);

	worker
		.add_products([product("p1", vec![content("c1", "Base")])])
		.unwrap();

	let created = worker.execute(&owner).unwrap();
	assert_eq!(created.products().state("p1"), Some(EntityState::Created));

	let result = worker.execute(&owner).unwrap();

	assert_eq!(result.products().state("p1"), Some(EntityState::Unchanged));
	assert_eq!(result.contents().state("c1"), Some(EntityState::Unchanged));
	assert_eq!(result.products().count(EntityState::Deleted), 0);
	assert_eq!(
		store.owner_product_uuid(&owner, "p1"),
		created.products().entity("p1").and_then(|product| product.uuid)
	);
}
