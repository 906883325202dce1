//! Dependency graph validation.
//!
//! Depth-first walk over satisfied dependencies. A back edge closes a cycle; the cycle is
//! accepted only if a shared promise on it can hand out a cycle-breaking placeholder and
//! some edge on it can consume that placeholder lazily (i.e. is not a prerequisite).

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::address;
use crate::error::CompositionError;
use crate::promise::ExportDescriptorPromise;

/// Validates the graph reachable from `root`, returning the addresses of every promise checked.
pub(super) fn check_graph(root: &Arc<ExportDescriptorPromise>) -> Result<FxHashSet<usize>, CompositionError> {
	let mut walk = Walk::default();
	walk.visit(root)?;
	Ok(walk.checked)
}

#[derive(Default)]
struct Walk {
	/// Promises on the current path, root first.
	path: Vec<Arc<ExportDescriptorPromise>>,
	/// `edges[i]` is the prerequisite flag of the edge leaving `path[i]`.
	edges: Vec<bool>,
	checked: FxHashSet<usize>,
}

impl Walk {
	fn visit(&mut self, promise: &Arc<ExportDescriptorPromise>) -> Result<(), CompositionError> {
		if self.checked.contains(&address(promise)) {
			return Ok(());
		}

		self.path.push(promise.clone());
		for dependency in promise.dependencies() {
			let Some(target) = dependency.check()? else {
				continue;
			};

			self.edges.push(dependency.is_prerequisite());
			match self.path.iter().position(|on_path| Arc::ptr_eq(on_path, &target)) {
				Some(start) => self.check_cycle(start)?,
				None => self.visit(&target)?,
			}
			self.edges.pop();
		}
		self.path.pop();

		self.checked.insert(address(promise));
		Ok(())
	}

	/// Checks the cycle formed by `path[start..]` and the edge just pushed back to `path[start]`.
	fn check_cycle(&self, start: usize) -> Result<(), CompositionError> {
		let members = &self.path[start..];
		let edges = &self.edges[start..];

		let has_shared = members.iter().any(|promise| promise.is_shared());
		let has_lazy_edge = edges.iter().any(|&is_prerequisite| !is_prerequisite);
		if has_shared && has_lazy_edge {
			tracing::trace!(length = members.len(), "registry.cycle_accepted");
			return Ok(());
		}

		let path = members
			.iter()
			.chain(members.first())
			.map(|promise| promise.to_string())
			.collect::<Vec<_>>()
			.join(" -> ");
		tracing::warn!(%path, has_shared, has_lazy_edge, "registry.cycle_rejected");
		Err(CompositionError::IllegalCycle { path })
	}
}
