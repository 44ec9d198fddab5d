//! Pending authorization states guarding the OAuth callback against CSRF.

// self
use crate::{_prelude::*, auth::SessionId};

/// Boxed future returned by [`StateStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage contract for authorization states awaiting their callback.
///
/// Entries are one-shot: [`StateStore::take`] removes the entry it returns. Expired entries
/// must be reported as absent.
pub trait StateStore
where
	Self: Send + Sync,
{
	/// Stores (or replaces) the pending authorization for `session`.
	fn put(&self, session: SessionId, pending: PendingAuthorization) -> StoreFuture<'_, ()>;

	/// Removes and returns the pending authorization for `session`, if still valid at `now`.
	fn take<'a>(
		&'a self,
		session: &'a SessionId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingAuthorization>>;
}

/// Error type produced by [`StateStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Backend-level failure for the storage engine.
	#[error("State store failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Authorization started for a session and not yet completed.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
	/// Opaque `state` value that must come back on the callback.
	pub state: String,
	/// PKCE verifier matching the challenge sent on the authorize URL.
	pub pkce_verifier: Option<String>,
	/// Instant after which the entry is rejected.
	pub expires_at: OffsetDateTime,
}
impl PendingAuthorization {
	/// Returns `true` once `now` has reached the expiry instant.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}
impl Debug for PendingAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingAuthorization")
			.field("state", &self.state)
			.field("pkce_verifier", &self.pkce_verifier.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

type StateMap = Arc<RwLock<HashMap<SessionId, PendingAuthorization>>>;

/// In-process [`StateStore`] for single-instance deployments and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore(StateMap);
impl MemoryStateStore {
	/// Number of entries currently held, expired ones included.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn take_now(
		map: StateMap,
		session: &SessionId,
		now: OffsetDateTime,
	) -> Option<PendingAuthorization> {
		let mut guard = map.write();

		guard.retain(|_, pending| !pending.is_expired(now));
		guard.remove(session)
	}
}
impl StateStore for MemoryStateStore {
	fn put(&self, session: SessionId, pending: PendingAuthorization) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(session, pending);

			Ok(())
		})
	}

	fn take<'a>(
		&'a self,
		session: &'a SessionId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingAuthorization>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::take_now(map, session, now)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn session(value: &str) -> SessionId {
		SessionId::new(value).expect("Session fixture should be valid.")
	}

	fn pending(state: &str, expires_at: OffsetDateTime) -> PendingAuthorization {
		PendingAuthorization { state: state.into(), pkce_verifier: None, expires_at }
	}

	#[tokio::test]
	async fn take_is_one_shot() {
		let store = MemoryStateStore::default();
		let now = OffsetDateTime::now_utc();

		store
			.put(session("s-1"), pending("abc", now + Duration::minutes(5)))
			.await
			.expect("Put should succeed.");

		let first = store.take(&session("s-1"), now).await.expect("Take should succeed.");

		assert_eq!(first.map(|entry| entry.state), Some("abc".into()));
		assert!(store.take(&session("s-1"), now).await.expect("Take should succeed.").is_none());
	}

	#[tokio::test]
	async fn expired_entries_are_absent_and_purged() {
		let store = MemoryStateStore::default();
		let now = OffsetDateTime::now_utc();

		store
			.put(session("old"), pending("x", now - Duration::seconds(1)))
			.await
			.expect("Put should succeed.");
		store
			.put(session("other-old"), pending("y", now))
			.await
			.expect("Put should succeed.");

		assert_eq!(store.len(), 2);
		assert!(store.take(&session("old"), now).await.expect("Take should succeed.").is_none());
		assert!(store.is_empty());
	}

	#[test]
	fn debug_redacts_verifier() {
		let entry = PendingAuthorization {
			state: "abc".into(),
			pkce_verifier: Some("super-secret-verifier".into()),
			expires_at: OffsetDateTime::UNIX_EPOCH,
		};

		assert!(!format!("{entry:?}").contains("super-secret-verifier"));
	}
}
