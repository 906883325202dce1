//! Resolution core of the mortise composition container.
//!
//! This crate turns promised exports into fully resolved objects:
//! - [`ExportDescriptorPromise`]: one deferred, memoized way of satisfying a [`Contract`]
//! - [`Descriptor`]: the result of fulfilling a promise, possibly a
//!   [`CycleBreakingExportDescriptor`] when a promise is re-entered during its own fulfillment
//! - [`Dependency`]: a contract a promise needs before it can fulfill itself
//! - [`PromiseRegistry`]: promises indexed by contract in a [`SparseIndex`]
//! - [`LifetimeContext`]: the sharing scope holding shared part instances
//!
//! # Resolution Flow
//!
//! 1. A request for a contract reaches [`PromiseRegistry::get_descriptor`].
//! 2. The registry locates the matching promise and validates its dependency graph.
//! 3. The promise computes its dependencies once, then runs its fulfillment function, which
//!    may recursively resolve the descriptors of its dependencies.
//! 4. The descriptor is memoized and returned to every caller; a caller that re-enters on the
//!    fulfilling thread receives a forwarding placeholder instead.

pub mod config;
pub mod contract;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod lifetime;
pub mod promise;
pub mod registry;

pub use config::{AmbiguityPolicy, CompositionConfig, ConfigError};
pub use contract::Contract;
pub use dependency::{Dependency, Requirement};
pub use descriptor::{
	Activator, CycleBreakingExportDescriptor, Descriptor, ExportDescriptor, Instance, Metadata,
	downcast_instance,
};
pub use error::{CompositionError, FulfillmentError};
pub use lifetime::{LifetimeContext, SharingId};
pub use mortise_sparse_index::SparseIndex;
pub use promise::ExportDescriptorPromise;
pub use registry::{DependencyAccessor, PromiseRegistry, RegistryBuilder};
