//! Authorization-code flow: authorize URL, CSRF state bookkeeping, optional PKCE, and the
//! code exchange.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenPair},
	flows::{PendingAuthorization, TokenManager},
	http::MarketplaceHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;
const PKCE_METHOD: &str = "S256";

/// Authorize URL handed to the user agent, plus the values that must come back on the callback.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Session that started the authorization.
	pub session: SessionId,
	/// Opaque `state` value embedded in the URL.
	pub state: String,
	/// Fully-formed authorize URL.
	pub authorize_url: Url,
	/// S256 challenge sent on the URL when PKCE is enabled.
	pub code_challenge: Option<String>,
	/// Instant after which the callback is rejected.
	pub expires_at: OffsetDateTime,
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the provider authorize URL.
	///
	/// Deterministic and side-effect free; `state` is appended only when provided.
	pub fn build_authorization_url(&self, state: Option<&str>) -> Result<Url> {
		self.authorize_url(state, None)
	}

	/// Starts an authorization for `session`: generates and stores a fresh `state` (and a PKCE
	/// verifier when enabled) and returns the URL to send the user to.
	pub async fn start_authorization(&self, session: SessionId) -> Result<AuthorizationRequest> {
		let span = FlowSpan::new(FlowKind::AuthorizationCode, "start_authorization");

		span.instrument(async move {
			let state = random_string(STATE_LEN);
			let verifier = self.config.pkce.then(|| random_string(PKCE_VERIFIER_LEN));
			let code_challenge = verifier.as_deref().map(compute_pkce_challenge);
			let authorize_url = self.authorize_url(Some(&state), code_challenge.as_deref())?;
			let expires_at =
				OffsetDateTime::now_utc().checked_add(self.config.state_ttl()).ok_or_else(|| {
					Error::InvalidRequest {
						reason: "authorization state lifetime overflows the clock".into(),
					}
				})?;
			let pending =
				PendingAuthorization { state: state.clone(), pkce_verifier: verifier, expires_at };

			self.state_store.put(session.clone(), pending).await?;

			Ok(AuthorizationRequest { session, state, authorize_url, code_challenge, expires_at })
		})
		.await
	}

	/// Completes the authorization started by [`TokenManager::start_authorization`].
	///
	/// The pending state is consumed whether or not it matches. A missing, expired, or
	/// mismatched state fails with [`Error::InvalidState`] before any request is made.
	pub async fn complete_authorization(
		&self,
		session: &SessionId,
		returned_state: &str,
		code: &str,
	) -> Result<TokenPair> {
		let pending = self
			.state_store
			.take(session, OffsetDateTime::now_utc())
			.await?
			.filter(|pending| pending.state == returned_state)
			.ok_or(Error::InvalidState)?;

		self.exchange(code, pending.pkce_verifier.as_deref(), "complete_authorization").await
	}

	/// Exchanges an authorization code for a new pair, replacing the held one on success.
	///
	/// Codes are single-use, so this is not idempotent. A rejection surfaces as
	/// [`Error::ExternalAuth`] and leaves the held pair untouched.
	pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenPair> {
		self.exchange(code, None, "exchange_code_for_token").await
	}

	async fn exchange(
		&self,
		code: &str,
		pkce_verifier: Option<&str>,
		stage: &'static str,
	) -> Result<TokenPair> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if code.trim().is_empty() {
					return Err(Error::InvalidRequest {
						reason: "authorization code is empty".into(),
					});
				}

				let _singleflight = self.flow_guard.lock().await;
				let pair =
					self.facade()?.exchange_authorization_code(code, pkce_verifier).await?;

				self.credentials.write().replace(pair.clone());

				Ok(pair)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn authorize_url(&self, state: Option<&str>, code_challenge: Option<&str>) -> Result<Url> {
		let mut url = self.config.authorization_endpoint()?;

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", &self.config.client_id);
			pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
			pairs.append_pair("scope", &self.config.scope);

			if let Some(state) = state {
				pairs.append_pair("state", state);
			}
			if let Some(challenge) = code_challenge {
				pairs.append_pair("code_challenge", challenge);
				pairs.append_pair("code_challenge_method", PKCE_METHOD);
			}
		}

		Ok(url)
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
