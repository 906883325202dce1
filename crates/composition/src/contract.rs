//! Contract identities.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Identity of a requested capability: a type name plus an optional discriminating name.
///
/// Contracts compare by type name and name. [`Contract::key`] is a stable 32-bit hash of
/// both, used to index contracts in a [`mortise_sparse_index::SparseIndex`]; distinct
/// contracts may share a key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Contract {
	type_name: Cow<'static, str>,
	name: Option<Cow<'static, str>>,
	key: u32,
}

impl Contract {
	/// Creates an unnamed contract for `type_name`.
	pub fn new(type_name: impl Into<Cow<'static, str>>) -> Self {
		Self::build(type_name.into(), None)
	}

	/// Creates a contract for `type_name` discriminated by `name`.
	pub fn named(type_name: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
		Self::build(type_name.into(), Some(name.into()))
	}

	/// Creates an unnamed contract for the Rust type `T`.
	pub fn of<T: ?Sized>() -> Self {
		Self::new(std::any::type_name::<T>())
	}

	/// Creates a contract for the Rust type `T` discriminated by `name`.
	pub fn of_named<T: ?Sized>(name: impl Into<Cow<'static, str>>) -> Self {
		Self::named(std::any::type_name::<T>(), name)
	}

	/// Creates an unnamed contract with a chosen key, to force index collisions.
	#[cfg(test)]
	pub(crate) fn with_key(type_name: &'static str, key: u32) -> Self {
		Self {
			type_name: Cow::Borrowed(type_name),
			name: None,
			key,
		}
	}

	fn build(type_name: Cow<'static, str>, name: Option<Cow<'static, str>>) -> Self {
		let mut hasher = FxHasher::default();
		type_name.hash(&mut hasher);
		name.hash(&mut hasher);
		let hash = hasher.finish();
		Self {
			type_name,
			name,
			key: (hash ^ (hash >> 32)) as u32,
		}
	}

	/// Returns the contract type name.
	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// Returns the discriminating name, if any.
	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	/// Returns the index key derived from this contract.
	#[inline]
	pub fn key(&self) -> u32 {
		self.key
	}
}

impl fmt::Display for Contract {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.name {
			Some(name) => write!(f, "{} \"{}\"", self.type_name, name),
			None => f.write_str(&self.type_name),
		}
	}
}

impl fmt::Debug for Contract {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Contract({self})")
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_display_with_and_without_name() {
		assert_eq!(Contract::new("Logger").to_string(), "Logger");
		assert_eq!(Contract::named("Logger", "audit").to_string(), "Logger \"audit\"");
	}

	#[test]
	fn test_equality_ignores_construction_path() {
		struct Widget;
		assert_eq!(Contract::of::<Widget>(), Contract::new(std::any::type_name::<Widget>()));
		assert_eq!(Contract::of_named::<Widget>("x"), Contract::named(std::any::type_name::<Widget>(), "x".to_string()));
		assert_ne!(Contract::of::<Widget>(), Contract::of_named::<Widget>("x"));
	}

	#[test]
	fn test_key_is_stable_and_name_sensitive() {
		let a = Contract::named("Service", "primary");
		let b = Contract::named("Service".to_string(), "primary".to_string());
		assert_eq!(a.key(), b.key());
		assert_ne!(Contract::new("Service").key(), a.key());
	}
}
