//! Thread-safe, process-lifetime cache for the single live access credential.
//!
//! The store never performs I/O. Every accessor takes the same lock, so a reader can never
//! observe a half-written [`Credential`], and [`CredentialStore::valid_token`] answers "is it
//! valid, and what is it" under one acquisition.

// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
};

/// Freshness of the cached credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheStatus {
	/// Nothing has been stored yet.
	Empty,
	/// A credential is stored and outside the safety margin.
	Fresh,
	/// A credential is stored but expired or within the safety margin.
	Stale,
}
impl CacheStatus {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheStatus::Empty => "empty",
			CacheStatus::Fresh => "fresh",
			CacheStatus::Stale => "stale",
		}
	}
}
impl Display for CacheStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// In-memory holder of the current access credential.
#[derive(Debug)]
pub struct CredentialStore {
	current: RwLock<Option<Credential>>,
	safety_margin: Duration,
}
impl CredentialStore {
	/// Reserve kept before the expiry instant; tokens inside it are treated as expired.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(2);

	/// Creates an empty store using [`Self::DEFAULT_SAFETY_MARGIN`].
	pub fn new() -> Self {
		Self::with_safety_margin(Self::DEFAULT_SAFETY_MARGIN)
	}

	/// Creates an empty store with a custom safety margin (negative values clamp to zero).
	pub fn with_safety_margin(margin: Duration) -> Self {
		let safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		Self { current: RwLock::new(None), safety_margin }
	}

	/// Returns the configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Replaces the current credential unconditionally.
	pub fn save(&self, token: impl Into<TokenSecret>, expires_at: Option<OffsetDateTime>) {
		self.save_credential(Credential::new(token, expires_at));
	}

	/// Replaces the current credential with a fully built record.
	pub fn save_credential(&self, credential: Credential) {
		*self.current.write() = Some(credential);
	}

	/// Returns the stored token regardless of validity.
	pub fn get(&self) -> Option<TokenSecret> {
		self.current.read().as_ref().map(|credential| credential.token.clone())
	}

	/// Returns `true` if a token is stored and is valid now.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if a token is stored and is valid at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CacheStatus::Fresh)
	}

	/// Returns the stored token only if it is valid now.
	pub fn valid_token(&self) -> Option<TokenSecret> {
		self.valid_token_at(OffsetDateTime::now_utc())
	}

	/// Returns the stored token only if it is valid at `instant`.
	pub fn valid_token_at(&self, instant: OffsetDateTime) -> Option<TokenSecret> {
		self.current
			.read()
			.as_ref()
			.filter(|credential| credential.is_valid_at(instant, self.safety_margin))
			.map(|credential| credential.token.clone())
	}

	/// Classifies the cached credential at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> CacheStatus {
		match self.current.read().as_ref() {
			None => CacheStatus::Empty,
			Some(credential) if credential.is_valid_at(instant, self.safety_margin) =>
				CacheStatus::Fresh,
			Some(_) => CacheStatus::Stale,
		}
	}

	/// Classifies the cached credential now.
	pub fn status(&self) -> CacheStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Expiry of the stored credential; `None` when nothing is stored or it never expires.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.current.read().as_ref().and_then(|credential| credential.expires_at)
	}

	/// Issued-at instant of the stored credential.
	pub fn issued_at(&self) -> Option<OffsetDateTime> {
		self.current.read().as_ref().map(|credential| credential.issued_at)
	}
}
impl Default for CredentialStore {
	fn default() -> Self {
		Self::new()
	}
}
