//! Strongly typed identifiers for subjects and realms.

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

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (subject, realm).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (subject, realm).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (subject, realm).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { SubjectId, "External identity id (`sub`) of a realm user.", "Subject" }
def_id! { RealmName, "Name of the identity provider realm.", "Realm" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
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
	fn identifiers_reject_padding_and_blank_values() {
		assert!(SubjectId::new(" 6f1c").is_err(), "Leading whitespace must be rejected.");
		assert!(SubjectId::new("6f1c ").is_err(), "Trailing whitespace must be rejected.");
		assert!(RealmName::new("").is_err());

		let subject = SubjectId::new("6f1c2a4e-2f43-4a51-9a67-0a1d5cbb7f10")
			.expect("UUID subject fixture should be valid.");

		assert_eq!(subject.as_ref(), "6f1c2a4e-2f43-4a51-9a67-0a1d5cbb7f10");
		assert_eq!(format!("{subject:?}"), "Subject(6f1c2a4e-2f43-4a51-9a67-0a1d5cbb7f10)");
	}

	#[test]
	fn serde_enforces_validation() {
		let realm: RealmName =
			serde_json::from_str("\"hackerspace\"").expect("Realm should deserialize successfully.");

		assert_eq!(realm.as_ref(), "hackerspace");
		assert!(serde_json::from_str::<RealmName>("\"with space\"").is_err());
		assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
	}

	#[test]
	fn unicode_whitespace_and_length_limits() {
		let nbsp = format!("subject{}id", '\u{00A0}');

		assert!(SubjectId::new(&nbsp).is_err());

		SubjectId::new("a".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		assert!(SubjectId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<SubjectId, u8> = HashMap::from_iter([(
			SubjectId::new("subject-123").expect("Subject used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("subject-123"), Some(&7));
	}
}
