use ec_catalog::Owner;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
	#[error("entity not found <uuid='{0}'>")]
	EntityNotFound(Uuid),
	#[error("entity already persisted <uuid='{0}'>")]
	AlreadyPersisted(Uuid),
	#[error("duplicate mapping for entity <id='{entity_id}'> in owner {owner}")]
	DuplicateMapping { owner: Owner, entity_id: String },
}
