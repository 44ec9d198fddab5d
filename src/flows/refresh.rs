//! Refresh-token rotation behind a single-flight guard.
//!
//! [`TokenManager::refresh_access_token`] records the credential epoch before waiting on the
//! manager's guard. When the guard is acquired and the epoch has moved, another caller
//! completed a refresh (or an exchange) in the meantime; its outcome is replayed without a
//! network call. Otherwise a `grant_type=refresh_token` request is sent and the resulting pair
//! replaces the previous one in a single write.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	error::TransportError,
	flows::TokenManager,
	http::MarketplaceHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Summary of a failed refresh, kept so queued callers can receive the same failure.
///
/// The failure kind survives the replay: a timed-out refresh reaches every waiter as a
/// [`TransportError`], never as a provider rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RefreshFailure {
	/// Token endpoint rejected the grant.
	Rejected { status: Option<u16>, reason: String },
	/// Connection-level failure.
	Network { detail: String },
	/// Request exceeded the configured timeout.
	Timeout { detail: String },
	/// Transport failed without a structured cause.
	Transport { message: String },
	/// Failed locally before reaching the network.
	Local { reason: String },
}
impl RefreshFailure {
	fn from_error(err: &Error) -> Self {
		match err {
			Error::ExternalAuth { status, reason } =>
				Self::Rejected { status: *status, reason: reason.clone() },
			Error::Transport(TransportError::Network { source }) =>
				Self::Network { detail: source.to_string() },
			Error::Transport(TransportError::Timeout { source }) =>
				Self::Timeout { detail: source.to_string() },
			Error::Transport(TransportError::Io(source)) =>
				Self::Network { detail: source.to_string() },
			Error::Transport(TransportError::Other { message }) =>
				Self::Transport { message: message.clone() },
			other => Self::Local { reason: other.to_string() },
		}
	}

	fn to_error(&self) -> Error {
		match self {
			Self::Rejected { status, reason } =>
				Error::ExternalAuth { status: *status, reason: reason.clone() },
			Self::Network { detail } => TransportError::network(ReplayedFailure(detail.clone())).into(),
			Self::Timeout { detail } => TransportError::timeout(ReplayedFailure(detail.clone())).into(),
			Self::Transport { message } => TransportError::Other { message: message.clone() }.into(),
			Self::Local { reason } => Error::InvalidRequest { reason: reason.clone() },
		}
	}
}

/// Cause attached to a transport failure replayed from a concurrent refresh.
#[derive(Debug, ThisError)]
#[error("{0} (shared with a concurrent refresh)")]
struct ReplayedFailure(String);

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges the held refresh token for a new pair.
	///
	/// Without a refresh token this fails with [`Error::MissingCredential`] and performs no
	/// request. A provider rejection yields [`Error::ExternalAuth`] and leaves the held pair
	/// untouched. When the provider omits a new refresh token the previous one is kept.
	pub async fn refresh_access_token(&self) -> Result<TokenPair> {
		let observed = self.snapshot().epoch;

		self.refresh_since(observed).await
	}

	/// Refreshes unless the credentials already changed after `observed_epoch`.
	pub(crate) async fn refresh_since(&self, observed_epoch: u64) -> Result<TokenPair> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _singleflight = self.flow_guard.lock().await;

				if let Some(replayed) = self.replay_since(observed_epoch) {
					self.refresh_metrics.record_coalesced();
					tracing::debug!(epoch = observed_epoch, "Reusing the outcome of a concurrent refresh.");

					return replayed;
				}

				self.refresh_metrics.record_attempt();

				let previous = self.credentials.read().pair.clone();
				let refresh_token = match previous.as_ref().and_then(|pair| pair.refresh_token.clone())
				{
					Some(token) => token,
					None => {
						self.refresh_metrics.record_failure();

						return Err(Error::MissingCredential);
					},
				};
				let outcome = match self.facade() {
					Ok(facade) => facade.refresh_token(refresh_token.expose()).await,
					Err(err) => Err(err),
				};

				match outcome {
					Ok(pair) => {
						let pair = pair.or_refresh_from(Some(&refresh_token));

						self.credentials.write().replace(pair.clone());
						self.refresh_metrics.record_success();

						Ok(pair)
					},
					Err(err) => {
						tracing::warn!(status = ?err.status(), "Refresh was rejected.");

						self.credentials.write().record_failure(RefreshFailure::from_error(&err));
						self.refresh_metrics.record_failure();

						Err(err)
					},
				}
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn replay_since(&self, observed_epoch: u64) -> Option<Result<TokenPair>> {
		let credentials = self.credentials.read();

		if credentials.epoch == observed_epoch {
			return None;
		}
		if let Some(failure) = &credentials.last_failure {
			return Some(Err(failure.to_error()));
		}

		Some(credentials.pair.clone().ok_or(Error::MissingCredential))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejections_replay_as_external_auth() {
		let failure = RefreshFailure::from_error(&Error::ExternalAuth {
			status: Some(400),
			reason: "invalid_grant".into(),
		});

		assert!(matches!(
			failure.to_error(),
			Error::ExternalAuth { status: Some(400), ref reason } if reason == "invalid_grant"
		));
		assert!(failure.to_error().requires_reauthentication());
	}

	#[test]
	fn transport_failures_replay_as_transport_errors() {
		let timeout = RefreshFailure::from_error(&Error::Transport(TransportError::timeout(
			std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed"),
		)));

		assert_eq!(timeout, RefreshFailure::Timeout { detail: "deadline elapsed".into() });

		let replayed = timeout.to_error();

		assert!(matches!(replayed, Error::Transport(TransportError::Timeout { .. })));
		assert!(!replayed.requires_reauthentication());
		assert_eq!(replayed.status(), None);

		let io = RefreshFailure::from_error(&Error::Transport(TransportError::Io(
			std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
		)));

		assert!(matches!(io.to_error(), Error::Transport(TransportError::Network { .. })));

		let other = RefreshFailure::from_error(&Error::Transport(TransportError::Other {
			message: "unclassified".into(),
		}));

		assert!(matches!(
			other.to_error(),
			Error::Transport(TransportError::Other { ref message }) if message == "unclassified"
		));
	}

	#[test]
	fn local_failures_do_not_masquerade_as_rejections() {
		let failure = RefreshFailure::from_error(&Error::InvalidState);

		assert!(matches!(failure.to_error(), Error::InvalidRequest { .. }));
	}
}
