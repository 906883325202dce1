//! Export descriptor promises.
//!
//! # Role
//!
//! An [`ExportDescriptorPromise`] is one candidate way of satisfying a contract. Its
//! dependency list and its descriptor are both deferred and memoized: neither producer runs
//! at construction, and each runs at most once successfully.
//!
//! # Fulfillment State
//!
//! The descriptor is guarded by a small state machine:
//!
//! | State | `get_descriptor` on the owning thread | on another thread |
//! |-------|---------------------------------------|-------------------|
//! | `NotStarted` | becomes owner, fulfills | becomes owner, fulfills |
//! | `InProgress` | cycle-breaking placeholder | placeholder if that thread is itself fulfilling, else waits |
//! | `Done` | memoized descriptor | memoized descriptor |
//!
//! A failed or panicking fulfillment returns the state to `NotStarted` and wakes waiters, so
//! the next request retries.
//!
//! # Invariants
//!
//! - The fulfillment function never runs concurrently with itself and never runs again after
//!   it has succeeded.
//!   - Enforced in: [`ExportDescriptorPromise::get_descriptor`].
//!   - Tested by: `tests::test_descriptor_fulfilled_once_across_threads`
//! - Re-entry on the fulfilling thread never recurses into fulfillment.
//!   - Enforced in: [`ExportDescriptorPromise::get_descriptor`] (owner check).
//!   - Tested by: `tests::test_self_cycle_returns_forwarding_placeholder`
//! - A thread that is fulfilling some promise never blocks on another thread's fulfillment,
//!   so two threads each fulfilling one half of a cycle both receive placeholders.
//!   - Enforced in: [`ExportDescriptorPromise::get_descriptor`] (`FULFILLING` depth check).
//!   - Tested by: `tests::test_cycle_split_across_threads_completes`
//!
//! Threads that are not fulfilling anything still wait, which keeps fulfillment
//! exactly-once for plain concurrent requests.

use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::contract::Contract;
use crate::dependency::Dependency;
use crate::descriptor::{CycleBreakingExportDescriptor, Descriptor, ExportDescriptor};
use crate::error::{CompositionError, FulfillmentError};

type DependencyFn = Box<dyn Fn() -> Vec<Dependency> + Send + Sync>;
type FulfillmentFn = Box<dyn Fn(&[Dependency]) -> Result<ExportDescriptor, FulfillmentError> + Send + Sync>;

thread_local! {
	/// Number of fulfillments running on this thread.
	static FULFILLING: Cell<usize> = const { Cell::new(0) };
}

enum FulfillmentState {
	NotStarted,
	InProgress(ThreadId),
	Done(Arc<ExportDescriptor>),
}

/// Deferred descriptor shared between a promise and its cycle-breaking placeholders.
pub(crate) struct DescriptorCell {
	state: Mutex<FulfillmentState>,
	done: Condvar,
}

impl DescriptorCell {
	fn new() -> Self {
		Self {
			state: Mutex::new(FulfillmentState::NotStarted),
			done: Condvar::new(),
		}
	}

	/// Returns the descriptor if fulfillment has completed.
	pub(crate) fn completed(&self) -> Option<Arc<ExportDescriptor>> {
		match &*self.state.lock() {
			FulfillmentState::Done(descriptor) => Some(descriptor.clone()),
			_ => None,
		}
	}
}

/// Publishes the outcome of one fulfillment attempt.
///
/// Dropping without [`complete`](Self::complete) (error or panic) resets the cell.
struct FulfillmentGuard<'a> {
	cell: &'a DescriptorCell,
	completed: bool,
}

impl<'a> FulfillmentGuard<'a> {
	fn enter(cell: &'a DescriptorCell) -> Self {
		FULFILLING.with(|depth| depth.set(depth.get() + 1));
		Self { cell, completed: false }
	}

	fn complete(mut self, descriptor: ExportDescriptor) -> Arc<ExportDescriptor> {
		let descriptor = Arc::new(descriptor);
		*self.cell.state.lock() = FulfillmentState::Done(descriptor.clone());
		self.completed = true;
		self.cell.done.notify_all();
		descriptor
	}
}

impl Drop for FulfillmentGuard<'_> {
	fn drop(&mut self) {
		FULFILLING.with(|depth| depth.set(depth.get() - 1));
		if !self.completed {
			*self.cell.state.lock() = FulfillmentState::NotStarted;
			self.cell.done.notify_all();
		}
	}
}

/// A promise that a contract can be satisfied, plus however it gets satisfied.
pub struct ExportDescriptorPromise {
	contract: Contract,
	origin: String,
	is_shared: bool,
	dependency_fn: DependencyFn,
	dependencies: OnceLock<Box<[Dependency]>>,
	fulfillment: FulfillmentFn,
	cell: Arc<DescriptorCell>,
}

impl ExportDescriptorPromise {
	/// Creates a promise.
	///
	/// - `origin` describes where the export comes from (e.g. the part type), for diagnostics.
	/// - `is_shared` marks exports reused within a sharing scope; used by cycle checking.
	/// - `dependencies` lists what must be resolved before fulfilling. It must not call
	///   [`dependencies`](Self::dependencies) on this same promise.
	/// - `fulfillment` receives the resolved dependencies and produces the descriptor. It may
	///   request descriptors of other promises, which is how cycles arise.
	///
	/// Neither function is invoked here.
	pub fn new<D, I, F>(contract: Contract, origin: impl Into<String>, is_shared: bool, dependencies: D, fulfillment: F) -> Self
	where
		D: Fn() -> I + Send + Sync + 'static,
		I: IntoIterator<Item = Dependency>,
		F: Fn(&[Dependency]) -> Result<ExportDescriptor, FulfillmentError> + Send + Sync + 'static,
	{
		Self {
			contract,
			origin: origin.into(),
			is_shared,
			dependency_fn: Box::new(move || dependencies().into_iter().collect()),
			dependencies: OnceLock::new(),
			fulfillment: Box::new(fulfillment),
			cell: Arc::new(DescriptorCell::new()),
		}
	}

	/// Returns the contract fulfilled by this promise.
	pub fn contract(&self) -> &Contract {
		&self.contract
	}

	/// Returns where the export is provided from.
	pub fn origin(&self) -> &str {
		&self.origin
	}

	/// Returns true if the export is shared within some scope.
	pub fn is_shared(&self) -> bool {
		self.is_shared
	}

	/// Returns the dependencies, computing them on first access.
	pub fn dependencies(&self) -> &[Dependency] {
		self.dependencies.get_or_init(|| {
			let dependencies = (self.dependency_fn)().into_boxed_slice();
			tracing::trace!(promise = %self, count = dependencies.len(), "promise.dependencies");
			dependencies
		})
	}

	/// Returns true once a descriptor has been memoized.
	pub fn is_fulfilled(&self) -> bool {
		self.cell.completed().is_some()
	}

	/// Returns the promised descriptor, fulfilling the promise if necessary.
	///
	/// Re-entry from within this promise's own fulfillment returns
	/// [`Descriptor::CycleBreaking`], as does a request made while another thread fulfills
	/// this promise and the calling thread is fulfilling one of its own. Every other
	/// successful call returns the single memoized [`Descriptor::Ready`] value.
	pub fn get_descriptor(&self) -> Result<Descriptor, CompositionError> {
		let current = thread::current().id();
		let mut state = self.cell.state.lock();
		loop {
			let owner = match &*state {
				FulfillmentState::Done(descriptor) => return Ok(Descriptor::Ready(descriptor.clone())),
				FulfillmentState::NotStarted => break,
				FulfillmentState::InProgress(owner) => *owner,
			};
			let nested = owner != current && FULFILLING.with(Cell::get) > 0;
			if owner == current || nested {
				tracing::debug!(promise = %self, nested, "promise.cycle_break");
				return Ok(Descriptor::CycleBreaking(CycleBreakingExportDescriptor::new(
					self.contract.clone(),
					Arc::downgrade(&self.cell),
				)));
			}
			self.cell.done.wait(&mut state);
		}
		*state = FulfillmentState::InProgress(current);
		drop(state);

		let guard = FulfillmentGuard::enter(&self.cell);
		tracing::trace!(promise = %self, "promise.fulfill");
		match (self.fulfillment)(self.dependencies()) {
			Ok(descriptor) => {
				tracing::trace!(promise = %self, "promise.fulfilled");
				Ok(Descriptor::Ready(guard.complete(descriptor)))
			}
			Err(source) => {
				tracing::warn!(promise = %self, error = %source, "promise.fulfill_failed");
				Err(CompositionError::Unfulfilled {
					contract: self.contract.clone(),
					origin: self.origin.clone(),
					source,
				})
			}
		}
	}
}

impl fmt::Display for ExportDescriptorPromise {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} supplied by {}", self.contract, self.origin)
	}
}

impl fmt::Debug for ExportDescriptorPromise {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExportDescriptorPromise")
			.field("contract", &self.contract)
			.field("origin", &self.origin)
			.field("is_shared", &self.is_shared)
			.field("fulfilled", &self.is_fulfilled())
			.finish_non_exhaustive()
	}
}
