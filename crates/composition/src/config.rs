//! Resolution configuration.
//!
//! Configuration is format-neutral; [`CompositionConfig::from_toml`] loads it from TOML.
//!
//! ```toml
//! ambiguity = "first-registered"
//! check-cycles = false
//! ```

use serde::Deserialize;

/// What a single-valued lookup does when several promises claim the same contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
	/// Fail with [`crate::CompositionError::Ambiguous`].
	#[default]
	Reject,
	/// Use the promise registered first.
	FirstRegistered,
	/// Use the promise registered last.
	LastRegistered,
}

impl AmbiguityPolicy {
	/// Picks a single candidate out of `candidates`, in registration order.
	///
	/// Returns `Err(())` when the policy refuses to choose between several candidates.
	pub(crate) fn pick<'a, T>(self, candidates: &'a [T]) -> Result<Option<&'a T>, ()> {
		match (self, candidates) {
			(_, []) => Ok(None),
			(_, [only]) => Ok(Some(only)),
			(Self::Reject, _) => Err(()),
			(Self::FirstRegistered, [first, ..]) => Ok(Some(first)),
			(Self::LastRegistered, [.., last]) => Ok(Some(last)),
		}
	}
}

/// Registry-wide resolution settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CompositionConfig {
	/// Policy for single-valued lookups with several candidates.
	pub ambiguity: AmbiguityPolicy,
	/// Validate the dependency graph before fulfilling a requested contract.
	pub check_cycles: bool,
}

impl Default for CompositionConfig {
	fn default() -> Self {
		Self {
			ambiguity: AmbiguityPolicy::default(),
			check_cycles: true,
		}
	}
}

impl CompositionConfig {
	/// Parses a configuration from TOML. Missing keys take their defaults.
	pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("invalid composition config: {0}")]
	Toml(#[from] toml::de::Error),
}
