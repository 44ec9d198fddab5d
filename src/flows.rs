//! Token manager owning the OAuth credential lifecycle of one marketplace account.

pub mod authorize;
pub mod refresh;
pub mod state;

pub use authorize::*;
pub use refresh::*;
pub use state::*;

use refresh::RefreshFailure;

// self
use crate::{
	_prelude::*,
	auth::{ConnectionState, TokenPair, TokenSecret},
	config::MarketplaceConfig,
	http::MarketplaceHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Token manager specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Owns the [`TokenPair`] of one marketplace account and every operation that replaces it.
///
/// The pair sits behind a read-write lock and is only ever swapped as a whole. Code exchanges
/// and refreshes are serialized by a single async guard, and each completed attempt bumps an
/// epoch counter so callers that queued behind a refresh reuse its outcome instead of
/// spending the (possibly rotated) refresh token a second time.
///
/// Clones share credentials, guard, and metrics.
#[derive(Clone)]
pub struct TokenManager<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound marketplace request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Shared metrics recorder for refresh flow outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	config: Arc<MarketplaceConfig>,
	state_store: Arc<dyn StateStore>,
	credentials: Arc<RwLock<Credentials>>,
	flow_guard: Arc<AsyncMutex<()>>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	///
	/// Pending authorization states live in a [`MemoryStateStore`] until
	/// [`TokenManager::with_state_store`] swaps it.
	pub fn with_http_client(
		config: MarketplaceConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			refresh_metrics: Default::default(),
			config: Arc::new(config),
			state_store: Arc::new(MemoryStateStore::default()),
			credentials: Default::default(),
			flow_guard: Default::default(),
		}
	}

	/// Replaces the store holding pending authorization states.
	pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
		self.state_store = store;

		self
	}

	/// Configuration the manager was built with.
	pub fn config(&self) -> &MarketplaceConfig {
		&self.config
	}

	/// Seeds credentials loaded by an external persistence layer.
	pub fn set_tokens(&self, pair: TokenPair) {
		self.credentials.write().replace(pair);
	}

	/// Drops the held credentials, returning the manager to [`ConnectionState::Unauthenticated`].
	pub fn clear(&self) {
		self.credentials.write().take();
	}

	/// Returns a copy of the current pair, if any.
	pub fn tokens(&self) -> Option<TokenPair> {
		self.credentials.read().pair.clone()
	}

	/// Current connection state, derived from the presence of a pair.
	pub fn state(&self) -> ConnectionState {
		if self.credentials.read().pair.is_some() {
			ConnectionState::Authenticated
		} else {
			ConnectionState::Unauthenticated
		}
	}

	/// Current access token together with the epoch it belongs to.
	pub(crate) fn snapshot(&self) -> CredentialSnapshot {
		let credentials = self.credentials.read();

		CredentialSnapshot {
			access_token: credentials.pair.as_ref().map(|pair| pair.access_token.clone()),
			epoch: credentials.epoch,
		}
	}

	pub(crate) fn facade(&self) -> Result<BasicFacade<C, M>> {
		BasicFacade::from_config(
			&self.config,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest transport, bounded by the configured timeout
	/// and with redirects disabled.
	pub fn new(config: MarketplaceConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::new(config.request_timeout())?;

		Ok(Self::with_http_client(config, http_client, ReqwestTransportErrorMapper))
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let credentials = self.credentials.read();

		f.debug_struct("TokenManager")
			.field("config", &self.config)
			.field("tokens", &credentials.pair)
			.field("epoch", &credentials.epoch)
			.finish()
	}
}

/// Access token observed at one point in time, tagged with its epoch.
#[derive(Clone, Debug)]
pub(crate) struct CredentialSnapshot {
	pub(crate) access_token: Option<TokenSecret>,
	pub(crate) epoch: u64,
}

#[derive(Debug, Default)]
struct Credentials {
	pair: Option<TokenPair>,
	epoch: u64,
	// Outcome of the latest refresh, replayed to callers that waited on it.
	last_failure: Option<RefreshFailure>,
}
impl Credentials {
	fn replace(&mut self, pair: TokenPair) {
		self.pair = Some(pair);
		self.last_failure = None;
		self.epoch += 1;
	}

	fn take(&mut self) -> Option<TokenPair> {
		self.last_failure = None;
		self.epoch += 1;
		self.pair.take()
	}

	fn record_failure(&mut self, failure: RefreshFailure) {
		self.last_failure = Some(failure);
		self.epoch += 1;
	}
}
