//!
//! # Catalog Refresh Engine
//!
//! Reconciles an owner's locally persisted products and content with an upstream catalog.
//!
//! A refresh maps every entity it covers, existing locally or imported from upstream, to a node
//! of a dependency graph: pools own a product, products own their derived product, provided
//! products and content. A [`NodeProcessor`] then drives one [`NodeVisitor`] per entity kind over
//! the graph, in three passes:
//! - process, children first: decide which entities are created, updated or unchanged, and merge
//!   the imported changes into the local entities;
//! - prune, parents first: remove entities which are no longer referenced nor imported;
//! - apply, children first: persist the merged entities, sharing one row between every owner that
//!   ends up with an equivalent entity.
//!
//! Owner mapping writes are deferred until the results are compiled into a [`RefreshResult`].
//!
//! [`RefreshWorker`] wraps the whole sequence: it collects the imported entities, loads the
//! owner's existing ones, builds the graph and runs it.

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

mod builder;
mod config;
mod entities;
mod error;
mod mapper;
mod node;
mod processor;
mod result;
mod visitors;
mod worker;

pub use builder::{ContentNodeBuilder, NodeBuilder, NodeFactory, PoolNodeBuilder, ProductNodeBuilder};
pub use config::RefreshConfig;
pub use entities::{ContentMapper, EntityMapper, PoolMapper, ProductMapper};
pub use error::Error;
pub use mapper::NodeMapper;
pub use node::{EntityKind, EntityNode, GraphNode, MappedEntity, NodeId, NodeKey, NodeState};
pub use processor::{NodeProcessor, VisitorSet};
pub use result::{EntityState, EntityStates, RefreshResult};
pub use visitors::{ContentNodeVisitor, NodeVisitor, PoolNodeVisitor, ProductNodeVisitor};
pub use worker::RefreshWorker;
