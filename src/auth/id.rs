//! Strongly typed identifiers used in marketplace paths and session bookkeeping.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
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
			type Error = IdentifierError;

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
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const RESERVED: &[char] = &['/', '?', '#', '%', '&', '='];

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (session, item, site, category).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (session, item, site, category).
		kind: &'static str,
	},
	/// The identifier contains a character with meaning inside a URL.
	#[error("{kind} identifier contains the reserved character `{found}`.")]
	ContainsReserved {
		/// Kind of identifier (session, item, site, category).
		kind: &'static str,
		/// First reserved character found.
		found: char,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (session, item, site, category).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { SessionId, "Opaque identifier of the dashboard session driving an authorization.", "Session" }
def_id! { ItemId, "Marketplace listing identifier (for example `MLA123456789`).", "Item" }
def_id! { SiteId, "Marketplace site identifier (for example `MLA`).", "Site" }
def_id! { CategoryId, "Marketplace category identifier (for example `MLA1055`).", "Category" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if let Some(found) = view.chars().find(|ch| RESERVED.contains(ch)) {
		return Err(IdentifierError::ContainsReserved { kind, found });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_whitespace_and_path_characters() {
		assert!(ItemId::new(" MLA1").is_err(), "Leading whitespace must be rejected.");
		assert!(ItemId::new("MLA1 ").is_err(), "Trailing whitespace must be rejected.");
		assert!(SiteId::new("").is_err());
		assert_eq!(
			ItemId::new("MLA1/../users").expect_err("Slashes must be rejected."),
			IdentifierError::ContainsReserved { kind: "Item", found: '/' },
		);

		let item = ItemId::new("MLA123456789").expect("Item fixture should be considered valid.");

		assert_eq!(item.as_ref(), "MLA123456789");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let category: CategoryId =
			serde_json::from_str("\"MLA1055\"").expect("Category should deserialize successfully.");

		assert_eq!(category.as_ref(), "MLA1055");
		assert!(serde_json::from_str::<CategoryId>("\"with space\"").is_err());
		assert!(serde_json::from_str::<SessionId>("\"a?b\"").is_err());
	}

	#[test]
	fn length_limit_is_inclusive() {
		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		SessionId::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(SessionId::new(&too_long).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<SessionId, u8> = HashMap::from_iter([(
			SessionId::new("session-123").expect("Session used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("session-123"), Some(&7));
	}
}
