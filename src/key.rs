//! Strongly typed keys enforced across the guard domain.

// std
use std::{borrow::Borrow, ops::Deref, str::FromStr};
// self
use crate::_prelude::*;

macro_rules! def_key {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new key after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, KeyError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = KeyError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = KeyError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const KEY_MAX_LEN: usize = 128;

/// Error returned when key validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum KeyError {
	/// The key was empty.
	#[error("{kind} key cannot be empty.")]
	Empty {
		/// Kind of key (operation, owner, dependency).
		kind: &'static str,
	},
	/// The key contains whitespace characters.
	#[error("{kind} key contains whitespace.")]
	ContainsWhitespace {
		/// Kind of key (operation, owner, dependency).
		kind: &'static str,
	},
	/// The key exceeded the allowed character count.
	#[error("{kind} key exceeds {max} characters.")]
	TooLong {
		/// Kind of key (operation, owner, dependency).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_key! { OperationKey, "Identifier for a guarded operation (one rate budget + quota window).", "Operation" }
def_key! { OwnerId, "Identifier for the tenant/owner of a durable ledger balance.", "Owner" }
def_key! { DependencyName, "Name of an upstream dependency guarded by one circuit breaker.", "Dependency" }

impl From<&OperationKey> for DependencyName {
	fn from(value: &OperationKey) -> Self {
		// Operation keys satisfy the same validation rules, so the conversion is infallible.
		Self(value.0.clone())
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), KeyError> {
	if view.is_empty() {
		return Err(KeyError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(KeyError::ContainsWhitespace { kind });
	}
	if view.len() > KEY_MAX_LEN {
		return Err(KeyError::TooLong { kind, max: KEY_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn keys_reject_whitespace_and_empty() {
		assert!(OperationKey::new(" fetch-prices").is_err(), "Leading whitespace must be rejected.");
		assert!(OperationKey::new("fetch-prices ").is_err(), "Trailing whitespace must be rejected.");

		let op = OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");

		assert_eq!(op.as_ref(), "fetch-prices");
		assert!(OwnerId::new("").is_err());
		assert!(DependencyName::new("with space").is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let payload = "\"owner-42\"";
		let owner: OwnerId =
			serde_json::from_str(payload).expect("Owner should deserialize successfully.");

		assert_eq!(owner.as_ref(), "owner-42");
		assert!(serde_json::from_str::<OwnerId>("\"with space\"").is_err());
		assert!(serde_json::from_str::<OwnerId>("\" owner-42\"").is_err());
	}

	#[test]
	fn length_limits_apply() {
		let exact = "a".repeat(KEY_MAX_LEN);

		OperationKey::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(KEY_MAX_LEN + 1);

		assert!(OperationKey::new(&too_long).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<OperationKey, u8> = HashMap::from_iter([(
			OperationKey::new("fetch-prices").expect("Operation used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("fetch-prices"), Some(&7));
	}
}
