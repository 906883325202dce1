//! Dependencies between promises.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::contract::Contract;
use crate::descriptor::Descriptor;
use crate::error::CompositionError;
use crate::promise::ExportDescriptorPromise;

/// How strictly a dependency must be satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Requirement {
	/// Resolution fails if no export matches.
	#[default]
	Required,
	/// A missing export is acceptable.
	Optional,
}

#[derive(Clone)]
enum Target {
	Satisfied(Weak<ExportDescriptorPromise>),
	Missing,
	Oversupplied(Vec<String>),
}

/// One contract a promise needs before it can fulfill itself.
///
/// A satisfied dependency refers to its target promise without owning it; the registry
/// owns all promises.
#[derive(Clone)]
pub struct Dependency {
	site: String,
	contract: Contract,
	requirement: Requirement,
	is_prerequisite: bool,
	target: Target,
}

impl Dependency {
	/// Creates a required dependency satisfied by `target`.
	///
	/// `is_prerequisite` marks dependencies needed before the dependent part can be
	/// constructed (constructor arguments, as opposed to property imports).
	pub fn satisfied(site: impl Into<String>, target: &Arc<ExportDescriptorPromise>, is_prerequisite: bool) -> Self {
		Self {
			site: site.into(),
			contract: target.contract().clone(),
			requirement: Requirement::Required,
			is_prerequisite,
			target: Target::Satisfied(Arc::downgrade(target)),
		}
	}

	/// Creates a dependency for which no export exists.
	pub fn missing(site: impl Into<String>, contract: Contract, requirement: Requirement) -> Self {
		Self {
			site: site.into(),
			contract,
			requirement,
			is_prerequisite: false,
			target: Target::Missing,
		}
	}

	/// Creates a dependency that several exports claim to satisfy.
	pub fn oversupplied(site: impl Into<String>, contract: Contract, origins: Vec<String>, is_prerequisite: bool) -> Self {
		Self {
			site: site.into(),
			contract,
			requirement: Requirement::Required,
			is_prerequisite,
			target: Target::Oversupplied(origins),
		}
	}

	/// Returns the dependency with its requirement replaced.
	pub fn with_requirement(mut self, requirement: Requirement) -> Self {
		self.requirement = requirement;
		self
	}

	/// Returns a description of the importing site.
	pub fn site(&self) -> &str {
		&self.site
	}

	/// Returns the required contract.
	pub fn contract(&self) -> &Contract {
		&self.contract
	}

	/// Returns how strictly the dependency must be satisfied.
	pub fn requirement(&self) -> Requirement {
		self.requirement
	}

	/// Returns true if the target must exist before the dependent part is constructed.
	pub fn is_prerequisite(&self) -> bool {
		self.is_prerequisite
	}

	/// Returns true if exactly one target promise was found.
	pub fn is_satisfied(&self) -> bool {
		matches!(self.target, Target::Satisfied(_))
	}

	/// Returns the target promise, if satisfied and still alive.
	pub fn target(&self) -> Option<Arc<ExportDescriptorPromise>> {
		match &self.target {
			Target::Satisfied(target) => target.upgrade(),
			_ => None,
		}
	}

	/// Checks the dependency can be met, returning its target when there is one.
	///
	/// A missing optional dependency yields `Ok(None)`.
	pub fn check(&self) -> Result<Option<Arc<ExportDescriptorPromise>>, CompositionError> {
		match &self.target {
			Target::Satisfied(target) => target
				.upgrade()
				.map(Some)
				.ok_or_else(|| CompositionError::PromiseDropped {
					contract: self.contract.clone(),
				}),
			Target::Missing if self.requirement == Requirement::Optional => Ok(None),
			Target::Missing => Err(CompositionError::MissingDependency {
				contract: self.contract.clone(),
				site: self.site.clone(),
			}),
			Target::Oversupplied(origins) => Err(CompositionError::Ambiguous {
				contract: self.contract.clone(),
				origins: origins.clone(),
			}),
		}
	}

	/// Resolves the target's descriptor, which may be a cycle-breaking placeholder.
	///
	/// Fails for missing dependencies, including optional ones; check
	/// [`is_satisfied`](Self::is_satisfied) first when the dependency is optional.
	pub fn descriptor(&self) -> Result<Descriptor, CompositionError> {
		match self.check()? {
			Some(target) => target.get_descriptor(),
			None => Err(CompositionError::MissingDependency {
				contract: self.contract.clone(),
				site: self.site.clone(),
			}),
		}
	}
}

impl fmt::Display for Dependency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (imported by {})", self.contract, self.site)
	}
}

impl fmt::Debug for Dependency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let target = match &self.target {
			Target::Satisfied(_) => "satisfied",
			Target::Missing => "missing",
			Target::Oversupplied(_) => "oversupplied",
		};
		f.debug_struct("Dependency")
			.field("site", &self.site)
			.field("contract", &self.contract)
			.field("requirement", &self.requirement)
			.field("is_prerequisite", &self.is_prerequisite)
			.field("target", &target)
			.finish()
	}
}
