//! Promise registry.
//!
//! # Purpose
//!
//! Indexes [`ExportDescriptorPromise`]s by [`Contract`] so resolution can locate every way of
//! satisfying a request.
//!
//! # Mental Model
//!
//! 1. **Build Phase:** [`RegistryBuilder`] collects promises, grouping them by contract in
//!    registration order. Providers hand a [`DependencyAccessor`] to their dependency
//!    closures; it resolves against the registry once built.
//! 2. **Publication:** [`RegistryBuilder::build`] writes one bucket per [`Contract::key`] into
//!    a [`SparseIndex`]. Contracts whose keys collide share a bucket and are told apart by
//!    equality.
//! 3. **Resolution:** [`PromiseRegistry::get_descriptor`] picks a promise under the
//!    configured [`AmbiguityPolicy`](crate::AmbiguityPolicy), validates its dependency graph
//!    and fulfills it.
//!
//! # Concurrency
//!
//! The index is written once by `build` and read lock-free afterwards.

use std::sync::{Arc, OnceLock, Weak};

use mortise_sparse_index::SparseIndex;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::CompositionConfig;
use crate::contract::Contract;
use crate::dependency::{Dependency, Requirement};
use crate::descriptor::{Descriptor, Instance};
use crate::error::CompositionError;
use crate::lifetime::{LifetimeContext, SharingId};
use crate::promise::ExportDescriptorPromise;

mod validate;

type Promises = Box<[Arc<ExportDescriptorPromise>]>;

/// Contracts sharing one index key.
struct ContractBucket {
	entries: Vec<(Contract, Promises)>,
}

impl ContractBucket {
	fn find(&self, contract: &Contract) -> Option<&[Arc<ExportDescriptorPromise>]> {
		self.entries
			.iter()
			.find(|(candidate, _)| candidate == contract)
			.map(|(_, promises)| &**promises)
	}
}

/// Collects promises and builds a [`PromiseRegistry`].
pub struct RegistryBuilder {
	config: CompositionConfig,
	groups: FxHashMap<u32, Vec<(Contract, Vec<Arc<ExportDescriptorPromise>>)>>,
	count: usize,
	next_sharing_id: u32,
	handle: Arc<OnceLock<Weak<PromiseRegistry>>>,
}

impl RegistryBuilder {
	/// Creates an empty builder.
	pub fn new(config: CompositionConfig) -> Self {
		Self {
			config,
			groups: FxHashMap::default(),
			count: 0,
			next_sharing_id: 0,
			handle: Arc::new(OnceLock::new()),
		}
	}

	/// Returns the configuration the registry will use.
	pub fn config(&self) -> &CompositionConfig {
		&self.config
	}

	/// Returns an accessor for dependency closures, bound to the registry being built.
	pub fn accessor(&self) -> DependencyAccessor {
		DependencyAccessor {
			handle: self.handle.clone(),
		}
	}

	/// Allocates a sharing id for a shared part.
	pub fn allocate_sharing_id(&mut self) -> SharingId {
		let id = SharingId(self.next_sharing_id);
		self.next_sharing_id += 1;
		id
	}

	/// Registers a promise and returns the shared handle the registry will hold.
	pub fn add(&mut self, promise: ExportDescriptorPromise) -> Arc<ExportDescriptorPromise> {
		let promise = Arc::new(promise);
		let contract = promise.contract();
		let bucket = self.groups.entry(contract.key()).or_default();
		match bucket.iter_mut().find(|(existing, _)| existing == contract) {
			Some((_, promises)) => promises.push(promise.clone()),
			None => bucket.push((contract.clone(), vec![promise.clone()])),
		}
		self.count += 1;
		promise
	}

	/// Publishes the collected promises.
	pub fn build(self) -> Result<Arc<PromiseRegistry>, CompositionError> {
		let index = SparseIndex::new();
		let mut contracts = 0;
		for (key, entries) in self.groups {
			contracts += entries.len();
			let entries = entries
				.into_iter()
				.map(|(contract, promises)| (contract, promises.into_boxed_slice()))
				.collect();
			index.insert(key, ContractBucket { entries })?;
		}

		tracing::debug!(contracts, promises = self.count, depth = index.depth(), "registry.build");
		let registry = Arc::new(PromiseRegistry {
			config: self.config,
			index,
			contracts,
			promises: self.count,
			validated: Mutex::new(FxHashSet::default()),
		});
		let _ = self.handle.set(Arc::downgrade(&registry));
		Ok(registry)
	}
}

impl Default for RegistryBuilder {
	fn default() -> Self {
		Self::new(CompositionConfig::default())
	}
}

/// Promises indexed by contract.
pub struct PromiseRegistry {
	config: CompositionConfig,
	index: SparseIndex<ContractBucket>,
	contracts: usize,
	promises: usize,
	/// Promises whose dependency graphs passed validation, by address.
	validated: Mutex<FxHashSet<usize>>,
}

impl PromiseRegistry {
	/// Returns the configuration.
	pub fn config(&self) -> &CompositionConfig {
		&self.config
	}

	/// Returns every promise for `contract`, in registration order.
	pub fn promises(&self, contract: &Contract) -> &[Arc<ExportDescriptorPromise>] {
		self.index
			.get(contract.key())
			.and_then(|bucket| bucket.find(contract))
			.unwrap_or(&[])
	}

	/// Returns the single promise for `contract`, applying the ambiguity policy.
	pub fn find(&self, contract: &Contract) -> Result<Option<&Arc<ExportDescriptorPromise>>, CompositionError> {
		let candidates = self.promises(contract);
		self.config
			.ambiguity
			.pick(candidates)
			.map_err(|()| CompositionError::Ambiguous {
				contract: contract.clone(),
				origins: origins(candidates),
			})
	}

	/// Resolves the descriptor for `contract`.
	pub fn get_descriptor(&self, contract: &Contract) -> Result<Descriptor, CompositionError> {
		let promise = self
			.find(contract)?
			.ok_or_else(|| CompositionError::NotFound {
				contract: contract.clone(),
			})?;
		if self.config.check_cycles {
			self.validate(promise)?;
		}
		promise.get_descriptor()
	}

	/// Resolves and activates `contract`.
	pub fn get_export(&self, ctx: &LifetimeContext, contract: &Contract) -> Result<Instance, CompositionError> {
		self.get_descriptor(contract)?.activate(ctx)
	}

	/// Resolves and activates `contract`, downcasting the export to `T`.
	pub fn get_export_as<T>(&self, ctx: &LifetimeContext, contract: &Contract) -> Result<Arc<T>, CompositionError>
	where
		T: std::any::Any + Send + Sync,
	{
		self.get_descriptor(contract)?.activate_as(ctx, contract)
	}

	/// Checks the dependency graph reachable from `promise`.
	///
	/// Fails on required dependencies without an export, on ambiguous dependencies, and on
	/// cycles that cannot be broken. A cycle can be broken when at least one promise on it is
	/// shared and at least one of its edges is not a prerequisite.
	pub fn validate(&self, promise: &Arc<ExportDescriptorPromise>) -> Result<(), CompositionError> {
		if self.validated.lock().contains(&address(promise)) {
			return Ok(());
		}
		let checked = validate::check_graph(promise)?;
		self.validated.lock().extend(checked);
		Ok(())
	}

	/// Returns the number of registered promises.
	pub fn len(&self) -> usize {
		self.promises
	}

	/// Returns true if no promises are registered.
	pub fn is_empty(&self) -> bool {
		self.promises == 0
	}

	/// Returns the number of distinct contracts.
	pub fn contract_count(&self) -> usize {
		self.contracts
	}
}

impl std::fmt::Debug for PromiseRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PromiseRegistry")
			.field("config", &self.config)
			.field("contracts", &self.contracts)
			.field("promises", &self.promises)
			.finish_non_exhaustive()
	}
}

/// Resolves dependencies against a registry; handed to dependency closures.
///
/// Resolution sees the registry only after [`RegistryBuilder::build`]; earlier calls report
/// every dependency as missing.
#[derive(Clone)]
pub struct DependencyAccessor {
	handle: Arc<OnceLock<Weak<PromiseRegistry>>>,
}

impl DependencyAccessor {
	/// Resolves a dependency that must be satisfied.
	pub fn resolve_required(&self, site: impl Into<String>, contract: Contract, is_prerequisite: bool) -> Dependency {
		self.resolve(site.into(), contract, Requirement::Required, is_prerequisite)
	}

	/// Resolves a dependency that may be missing.
	pub fn resolve_optional(&self, site: impl Into<String>, contract: Contract, is_prerequisite: bool) -> Dependency {
		self.resolve(site.into(), contract, Requirement::Optional, is_prerequisite)
	}

	/// Resolves one dependency per export of `contract`.
	pub fn resolve_many(&self, site: impl Into<String>, contract: &Contract, is_prerequisite: bool) -> Vec<Dependency> {
		let Some(registry) = self.registry() else {
			return Vec::new();
		};
		let site = site.into();
		registry
			.promises(contract)
			.iter()
			.map(|target| Dependency::satisfied(site.clone(), target, is_prerequisite))
			.collect()
	}

	fn resolve(&self, site: String, contract: Contract, requirement: Requirement, is_prerequisite: bool) -> Dependency {
		let Some(registry) = self.registry() else {
			return Dependency::missing(site, contract, requirement);
		};
		let candidates = registry.promises(&contract);
		match registry.config.ambiguity.pick(candidates) {
			Ok(Some(target)) => Dependency::satisfied(site, target, is_prerequisite).with_requirement(requirement),
			Ok(None) => Dependency::missing(site, contract, requirement),
			Err(()) => Dependency::oversupplied(site, contract, origins(candidates), is_prerequisite),
		}
	}

	fn registry(&self) -> Option<Arc<PromiseRegistry>> {
		let registry = self.handle.get().and_then(Weak::upgrade);
		if registry.is_none() {
			tracing::warn!("registry.accessor_unbound");
		}
		registry
	}
}

fn origins(promises: &[Arc<ExportDescriptorPromise>]) -> Vec<String> {
	promises.iter().map(|p| p.origin().to_owned()).collect()
}

fn address(promise: &Arc<ExportDescriptorPromise>) -> usize {
	Arc::as_ptr(promise) as usize
}
