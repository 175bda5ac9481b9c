//! The cached access credential and its validity rules.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Short-lived access credential issued by the token exchange.
///
/// Values are replaced wholesale on refresh; nothing mutates a stored credential in place.
#[derive(Clone)]
pub struct Credential {
	/// Bearer token; callers must avoid logging it.
	pub token: TokenSecret,
	/// Issued-at instant reported by upstream (or observed locally).
	pub issued_at: OffsetDateTime,
	/// Expiry instant; `None` means the credential never expires.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Creates a credential issued now.
	pub fn new(token: impl Into<TokenSecret>, expires_at: Option<OffsetDateTime>) -> Self {
		Self { token: token.into(), issued_at: OffsetDateTime::now_utc(), expires_at }
	}

	/// Overrides the issued-at instant.
	pub fn with_issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = instant;

		self
	}

	/// Returns `true` if the credential may still be used at `instant`, keeping `margin` in
	/// reserve before the expiry.
	///
	/// A margin reaching past the earliest representable instant leaves no valid window.
	pub fn is_valid_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		match self.expires_at {
			None => true,
			Some(expires_at) =>
				expires_at.checked_sub(margin).is_some_and(|deadline| instant < deadline),
		}
	}

	/// Time left until expiry at `instant`, or `None` for credentials without an expiry.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - instant)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn validity_respects_margin_boundary() {
		let expires = macros::datetime!(2030-01-01 00:00 UTC);
		let credential = Credential::new("abc", Some(expires));
		let margin = Duration::minutes(2);

		assert!(credential.is_valid_at(expires - Duration::minutes(2) - Duration::SECOND, margin));
		assert!(!credential.is_valid_at(expires - Duration::minutes(2), margin));
		assert!(!credential.is_valid_at(expires, margin));
	}

	#[test]
	fn oversized_margin_reads_as_expired() {
		let credential = Credential::new("abc", Some(macros::datetime!(2030-01-01 00:00 UTC)));

		assert!(!credential.is_valid_at(macros::datetime!(2025-01-01 00:00 UTC), Duration::MAX));
	}

	#[test]
	fn missing_expiry_never_expires() {
		let credential = Credential::new("abc", None);

		assert!(credential.is_valid_at(macros::datetime!(2999-01-01 00:00 UTC), Duration::HOUR));
		assert_eq!(credential.remaining_at(OffsetDateTime::now_utc()), None);
	}

	#[test]
	fn debug_output_redacts_token() {
		let credential = Credential::new("very-secret", None);
		let rendered = format!("{credential:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("very-secret"));
	}
}
