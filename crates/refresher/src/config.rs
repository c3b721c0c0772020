use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
	/// Days an orphaned product is kept before it is deleted.
	///
	/// Negative values keep orphaned products forever, zero deletes them on the refresh that
	/// orphans them.
	pub orphaned_entity_grace_period: i32,

	/// Whether to rebuild an owner's product and content mappings when they don't match the
	/// refreshed catalog.
	pub rebuild_dirty_mappings: bool,
}

impl Default for RefreshConfig {
	fn default() -> Self {
		Self {
			orphaned_entity_grace_period: 0,
			rebuild_dirty_mappings: true,
		}
	}
}

impl RefreshConfig {
	/// Loads a config file, as TOML if its extension says so and as JSON otherwise.
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path)
			.with_context(|| format!("failed to read refresh config at {}", path.display()))?;

		debug!(path = %path.display(), "Loading refresh config;");

		let config = if path.extension().is_some_and(|ext| ext == "toml") {
			toml::from_str(&contents)
				.with_context(|| format!("invalid TOML refresh config at {}", path.display()))?
		} else {
			serde_json::from_str(&contents)
				.with_context(|| format!("invalid JSON refresh config at {}", path.display()))?
		};

		Ok(config)
	}

	#[must_use]
	pub const fn with_grace_period(mut self, days: i32) -> Self {
		self.orphaned_entity_grace_period = days;
		self
	}
}
