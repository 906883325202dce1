//! Shared part instances.
//!
//! # Role
//!
//! A [`LifetimeContext`] is the sharing boundary for shared exports: each [`SharingId`] is
//! activated at most once per context and the instance is handed to every later requester.
//!
//! # Concurrency
//!
//! - **Reads:** lock-free lookups in a [`SparseIndex`].
//! - **Writes:** serialized by a reentrant mutex, so activating one shared part may
//!   activate other shared parts on the same thread. Re-entering the *same* id is a cycle
//!   and fails with [`CompositionError::SharedActivationCycle`].

use std::cell::RefCell;
use std::fmt;

use mortise_sparse_index::SparseIndex;
use parking_lot::ReentrantMutex;

use crate::descriptor::Instance;
use crate::error::CompositionError;

/// Identifier of a shared part within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharingId(pub(crate) u32);

impl SharingId {
	/// Returns the underlying u32 value.
	#[inline]
	pub fn as_u32(self) -> u32 {
		self.0
	}
}

impl fmt::Display for SharingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Holds shared part instances for one sharing scope.
#[derive(Default)]
pub struct LifetimeContext {
	shared: SparseIndex<Instance>,
	/// Writer lock; the cell tracks ids currently being activated on the owning thread.
	writer: ReentrantMutex<RefCell<Vec<SharingId>>>,
}

impl LifetimeContext {
	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the shared instance for `id`, if it has been created.
	pub fn shared_instance(&self, id: SharingId) -> Option<Instance> {
		self.shared.get(id.0).cloned()
	}

	/// Returns the number of shared instances created so far.
	pub fn shared_count(&self) -> usize {
		self.shared.len()
	}

	/// Returns the shared instance for `id`, creating it with `create` on first request.
	pub fn get_or_create<F>(&self, id: SharingId, create: F) -> Result<Instance, CompositionError>
	where
		F: FnOnce(&LifetimeContext) -> Result<Instance, CompositionError>,
	{
		if let Some(instance) = self.shared.get(id.0) {
			return Ok(instance.clone());
		}

		let guard = self.writer.lock();
		if let Some(instance) = self.shared.get(id.0) {
			return Ok(instance.clone());
		}

		let _frame = ActivationFrame::enter(&guard, id)?;
		tracing::trace!(sharing_id = id.0, "lifetime.create_shared");
		let instance = create(self)?;
		self.shared.insert(id.0, instance.clone())?;
		Ok(instance)
	}
}

impl fmt::Debug for LifetimeContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LifetimeContext")
			.field("shared", &self.shared.len())
			.finish()
	}
}

/// Marks `id` as being activated until dropped.
struct ActivationFrame<'a> {
	active: &'a RefCell<Vec<SharingId>>,
	id: SharingId,
}

impl<'a> ActivationFrame<'a> {
	fn enter(active: &'a RefCell<Vec<SharingId>>, id: SharingId) -> Result<Self, CompositionError> {
		let mut ids = active.borrow_mut();
		if ids.contains(&id) {
			return Err(CompositionError::SharedActivationCycle { id });
		}
		ids.push(id);
		Ok(Self { active, id })
	}
}

impl Drop for ActivationFrame<'_> {
	fn drop(&mut self) {
		self.active.borrow_mut().retain(|&active| active != self.id);
	}
}
