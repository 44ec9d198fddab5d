//! OAuth token-endpoint facade and transport error mapping.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
	http::StatusCode,
};
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	config::MarketplaceConfig,
	error::{ConfigError, TransportError},
	http::{MarketplaceHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::FlowKind,
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
///
/// The same mapper serves token exchanges and resource calls; `kind` tells them apart.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		kind: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		kind: FlowKind,
		_meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => {
				let inner = *inner;

				if inner.is_builder() {
					return ConfigError::from(inner).into();
				}

				tracing::debug!(flow = kind.as_str(), timeout = inner.is_timeout(), "Transport failed.");

				TransportError::from(inner).into()
			},
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: format!("unclassified {kind} transport failure") }
				.into(),
		}
	}
}

pub(crate) trait OAuth2Facade
where
	Self: Send + Sync,
{
	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
	) -> FacadeFuture<'a, TokenPair>;

	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenPair>;
}

/// Token-endpoint client authenticating with `client_secret_post`.
pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &MarketplaceConfig,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::from_url(config.token_endpoint()?);
		let redirect_url = RedirectUrl::new(config.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_client_secret(ClientSecret::new(config.client_secret.clone()))
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self { oauth_client, http_client, error_mapper })
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
	) -> FacadeFuture<'a, TokenPair> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request =
				self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));

			if let Some(verifier) = pkce_verifier {
				request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					FlowKind::AuthorizationCode,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			Ok(token_pair_from(&response))
		})
	}

	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenPair> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(FlowKind::Refresh, meta.take(), err, self.error_mapper.as_ref())
				})?;

			Ok(token_pair_from(&response))
		})
	}
}

fn token_pair_from(response: &BasicTokenResponse) -> TokenPair {
	let access = response.access_token().secret().to_owned();

	match response.refresh_token() {
		Some(refresh) => TokenPair::new(access, refresh.secret().to_owned()),
		None => TokenPair::access_only(access),
	}
}

fn map_request_error<E, M>(
	kind: FlowKind,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, &response),
		RequestTokenError::Request(error) => mapper.map_transport_error(kind, meta.as_ref(), error),
		// A non-success status whose body is not an OAuth error document is still a rejection.
		RequestTokenError::Parse(source, _body) => match status {
			Some(code) if !(200..300).contains(&code) =>
				Error::ExternalAuth { status, reason: status_text(code) },
			_ => Error::ResponseParse { source, status: status.unwrap_or(200) },
		},
		RequestTokenError::Other(message) => match status {
			Some(code) if !(200..300).contains(&code) =>
				Error::ExternalAuth { status, reason: status_text(code) },
			_ => Error::ExternalAuth { status, reason: message },
		},
	}
}

fn map_server_response_error(status: Option<u16>, response: &BasicErrorResponse) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => match status {
			Some(code) => format!("{} ({})", status_text(code), response.error().as_ref()),
			None => response.error().as_ref().to_owned(),
		},
	};

	Error::ExternalAuth { status, reason }
}

/// Canonical reason phrase for `status`, falling back to the numeric code.
pub(crate) fn status_text(status: u16) -> String {
	StatusCode::from_u16(status)
		.ok()
		.and_then(|code| code.canonical_reason())
		.map(str::to_owned)
		.unwrap_or_else(|| status.to_string())
}
