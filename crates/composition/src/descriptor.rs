//! Export descriptors: the finished result of fulfilling a promise.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::contract::Contract;
use crate::error::CompositionError;
use crate::lifetime::{LifetimeContext, SharingId};
use crate::promise::DescriptorCell;

/// An activated export.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Produces an export instance within a lifetime context.
pub type Activator = Arc<dyn Fn(&LifetimeContext) -> Result<Instance, CompositionError> + Send + Sync>;

/// Ordered string metadata attached to an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
	/// Creates empty metadata.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an entry, returning the updated metadata.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	/// Returns the value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Returns an iterator over entries in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Returns the number of entries.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if there are no entries.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// A usable export: an activator plus metadata.
#[derive(Clone)]
pub struct ExportDescriptor {
	activator: Activator,
	metadata: Metadata,
}

impl ExportDescriptor {
	/// Creates a descriptor from an activator and metadata.
	pub fn new(activator: Activator, metadata: Metadata) -> Self {
		Self { activator, metadata }
	}

	/// Creates a descriptor without metadata from an activation closure.
	pub fn from_fn<F>(activate: F) -> Self
	where
		F: Fn(&LifetimeContext) -> Result<Instance, CompositionError> + Send + Sync + 'static,
	{
		Self::new(Arc::new(activate), Metadata::new())
	}

	/// Wraps `activator` so it runs at most once per [`LifetimeContext`] for `id`.
	pub fn shared(id: SharingId, activator: Activator, metadata: Metadata) -> Self {
		let shared: Activator = Arc::new(move |ctx: &LifetimeContext| ctx.get_or_create(id, |ctx| activator(ctx)));
		Self::new(shared, metadata)
	}

	/// Returns the activator.
	pub fn activator(&self) -> &Activator {
		&self.activator
	}

	/// Returns the metadata.
	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	/// Runs the activator.
	pub fn activate(&self, ctx: &LifetimeContext) -> Result<Instance, CompositionError> {
		(self.activator)(ctx)
	}
}

impl fmt::Debug for ExportDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExportDescriptor")
			.field("metadata", &self.metadata)
			.finish_non_exhaustive()
	}
}

/// Stand-in handed out when a promise is re-entered during its own fulfillment.
///
/// Holds a non-owning reference to the promise's fulfillment cell, so once the outer
/// fulfillment completes, [`resolve`](Self::resolve) yields the very same descriptor.
/// Use it only through deferred forwarding ([`activator`](Self::activator)); the real
/// descriptor does not exist while the cycle is being built.
#[derive(Clone)]
pub struct CycleBreakingExportDescriptor {
	contract: Contract,
	cell: Weak<DescriptorCell>,
}

impl CycleBreakingExportDescriptor {
	pub(crate) fn new(contract: Contract, cell: Weak<DescriptorCell>) -> Self {
		Self { contract, cell }
	}

	/// Returns the contract the placeholder stands in for.
	pub fn contract(&self) -> &Contract {
		&self.contract
	}

	/// Returns the real descriptor once the originating promise has been fulfilled.
	pub fn resolve(&self) -> Result<Arc<ExportDescriptor>, CompositionError> {
		let cell = self.cell.upgrade().ok_or_else(|| CompositionError::PromiseDropped {
			contract: self.contract.clone(),
		})?;
		cell.completed().ok_or_else(|| CompositionError::CycleUnresolved {
			contract: self.contract.clone(),
		})
	}

	/// Returns an activator that looks up the real descriptor when invoked.
	pub fn activator(&self) -> Activator {
		let this = self.clone();
		Arc::new(move |ctx: &LifetimeContext| this.resolve()?.activate(ctx))
	}
}

impl fmt::Debug for CycleBreakingExportDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CycleBreakingExportDescriptor")
			.field("contract", &self.contract)
			.field("resolved", &self.resolve().is_ok())
			.finish()
	}
}

/// Result of [`ExportDescriptorPromise::get_descriptor`](crate::ExportDescriptorPromise::get_descriptor).
#[derive(Debug, Clone)]
pub enum Descriptor {
	/// The memoized, fully fulfilled descriptor.
	Ready(Arc<ExportDescriptor>),
	/// A forwarding placeholder produced by a cycle.
	CycleBreaking(CycleBreakingExportDescriptor),
}

impl Descriptor {
	/// Returns true for a cycle-breaking placeholder.
	pub fn is_cycle_breaking(&self) -> bool {
		matches!(self, Self::CycleBreaking(_))
	}

	/// Returns the real descriptor, which for a placeholder requires the cycle to have completed.
	pub fn resolve(&self) -> Result<Arc<ExportDescriptor>, CompositionError> {
		match self {
			Self::Ready(descriptor) => Ok(descriptor.clone()),
			Self::CycleBreaking(placeholder) => placeholder.resolve(),
		}
	}

	/// Returns an activator; placeholders forward lazily at activation time.
	pub fn activator(&self) -> Activator {
		match self {
			Self::Ready(descriptor) => descriptor.activator().clone(),
			Self::CycleBreaking(placeholder) => placeholder.activator(),
		}
	}

	/// Activates the export.
	pub fn activate(&self, ctx: &LifetimeContext) -> Result<Instance, CompositionError> {
		self.resolve()?.activate(ctx)
	}

	/// Activates the export and downcasts it to `T`; `contract` names the export on mismatch.
	pub fn activate_as<T>(&self, ctx: &LifetimeContext, contract: &Contract) -> Result<Arc<T>, CompositionError>
	where
		T: Any + Send + Sync,
	{
		downcast_instance(self.activate(ctx)?, contract)
	}
}

/// Downcasts an activated export to `T`, naming `contract` on failure.
pub fn downcast_instance<T>(instance: Instance, contract: &Contract) -> Result<Arc<T>, CompositionError>
where
	T: Any + Send + Sync,
{
	instance.downcast::<T>().map_err(|_| CompositionError::TypeMismatch {
		contract: contract.clone(),
		expected: std::any::type_name::<T>(),
	})
}
