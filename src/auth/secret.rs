//! Secure token secret wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
///
/// Used for both the short-lived access token and the long-lived technical secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the secret is empty or whitespace only.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for TokenSecret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.expose(), "super-secret");
	}

	#[test]
	fn blank_detection_ignores_whitespace() {
		assert!(TokenSecret::from("").is_blank());
		assert!(TokenSecret::from("  \t").is_blank());
		assert!(!TokenSecret::from("x").is_blank());
	}

	#[test]
	fn deserializes_from_plain_string() {
		let secret: TokenSecret = serde_json::from_str("\"from-config\"")
			.expect("Token secret should deserialize from a JSON string.");

		assert_eq!(secret.expose(), "from-config");
	}
}
