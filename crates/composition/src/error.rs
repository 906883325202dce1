use mortise_sparse_index::DuplicateKey;

use crate::contract::Contract;
use crate::lifetime::SharingId;

/// Why a fulfillment function could not produce a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
	/// The fulfillment function ran but had no descriptor to offer.
	#[error("fulfillment function returned no export descriptor")]
	Absent,
	/// Resolving a dependency failed while fulfilling.
	#[error(transparent)]
	Composition(Box<CompositionError>),
}

impl From<CompositionError> for FulfillmentError {
	fn from(err: CompositionError) -> Self {
		Self::Composition(Box::new(err))
	}
}

/// Errors surfaced while resolving or activating exports.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
	/// A promise's fulfillment function failed.
	#[error("cannot fulfill {contract} supplied by {origin}: {source}")]
	Unfulfilled {
		contract: Contract,
		origin: String,
		#[source]
		source: FulfillmentError,
	},

	/// No promise is registered for the requested contract.
	#[error("no export was found for the contract {contract}")]
	NotFound { contract: Contract },

	/// A required dependency has no matching export.
	#[error("no export was found for the contract {contract}, required by {site}")]
	MissingDependency { contract: Contract, site: String },

	/// More than one export matched where at most one was expected.
	#[error("{count} exports were found for the contract {contract}: {list}", count = .origins.len(), list = .origins.join(", "))]
	Ambiguous {
		contract: Contract,
		origins: Vec<String>,
	},

	/// The dependency graph contains a cycle that cannot be broken.
	#[error("cannot break dependency cycle: {path}")]
	IllegalCycle { path: String },

	/// A cycle-breaking placeholder was consulted before its promise finished fulfilling.
	#[error("export descriptor for {contract} was used before its cyclic fulfillment completed")]
	CycleUnresolved { contract: Contract },

	/// The promise behind a dependency or placeholder no longer exists.
	#[error("the promise for {contract} has been dropped")]
	PromiseDropped { contract: Contract },

	/// A shared part was requested again while it was being created.
	#[error("shared part {id} was requested while it was being activated")]
	SharedActivationCycle { id: SharingId },

	/// An activated export had a different concrete type than requested.
	#[error("export for {contract} is not a {expected}")]
	TypeMismatch {
		contract: Contract,
		expected: &'static str,
	},

	/// An activator reported a failure.
	#[error("activation of {contract} failed: {message}")]
	Activation { contract: Contract, message: String },

	#[error(transparent)]
	Index(#[from] DuplicateKey),
}
