// std
use std::thread;
// crates.io
use time::macros::datetime;
// self
use ksef_gateway::{
	_preludet::*,
	auth::Credential,
	store::{CacheStatus, CredentialStore},
};

#[test]
fn readers_never_observe_a_torn_credential() {
	let store = Arc::new(CredentialStore::with_safety_margin(Duration::ZERO));
	let far = datetime!(2030-01-01 0:00 UTC);

	thread::scope(|scope| {
		for writer in 0..4 {
			let store = store.clone();

			scope.spawn(move || {
				for round in 0..250 {
					let token = format!("token-{writer}-{round}");
					// Token and expiry encode the same round so readers can cross-check them.
					let expires_at = far + Duration::seconds(round);

					store.save_credential(Credential::new(token, Some(expires_at)));
				}
			});
		}
		for _ in 0..4 {
			let store = store.clone();

			scope.spawn(move || {
				for _ in 0..250 {
					if let Some(token) = store.valid_token_at(far - Duration::days(1)) {
						assert!(token.expose().starts_with("token-"));
					}
				}
			});
		}
	});

	let token = store.get().expect("A credential should remain stored.");
	let round: i64 = token
		.expose()
		.rsplit('-')
		.next()
		.and_then(|raw| raw.parse().ok())
		.expect("Stored token should carry its round.");

	assert_eq!(store.expires_at(), Some(far + Duration::seconds(round)));
}

#[test]
fn status_follows_expiry_and_margin() {
	let store = CredentialStore::new();
	let expires_at = datetime!(2030-01-01 0:00 UTC);

	assert_eq!(store.status_at(expires_at), CacheStatus::Empty);

	store.save("t", Some(expires_at));

	assert_eq!(store.status_at(expires_at - Duration::minutes(3)), CacheStatus::Fresh);
	assert_eq!(store.status_at(expires_at - Duration::minutes(2)), CacheStatus::Stale);
	assert_eq!(store.status_at(expires_at + Duration::seconds(1)), CacheStatus::Stale);
	assert_eq!(store.get().as_ref().map(|token| token.expose()), Some("t"));
}
