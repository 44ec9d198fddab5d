//! Crate-level error types shared by the token manager, the API executor, and the webhook
//! dispatcher.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// CSRF state store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::flows::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No token is held; the account must be connected again.
	#[error("No marketplace credentials are available; re-authentication is required.")]
	MissingCredential,
	/// The provider rejected an authorization-code exchange or a refresh.
	#[error("Marketplace rejected the OAuth request: {reason}.")]
	ExternalAuth {
		/// HTTP status returned by the token endpoint, when known.
		status: Option<u16>,
		/// Provider status text or OAuth error description.
		reason: String,
	},
	/// A call hit 401 and the refresh that followed failed; treat as a lost session.
	#[error("Marketplace session expired and could not be refreshed.")]
	AuthExpired {
		/// Refresh failure that ended the session.
		#[source]
		source: Box<Error>,
	},
	/// A resource endpoint answered with a non-2xx status other than the recoverable 401.
	#[error("Marketplace API returned {status} {status_text}.")]
	RemoteApi {
		/// HTTP status code.
		status: u16,
		/// Canonical reason phrase for the status.
		status_text: String,
		/// Provider `message` field, when the error body carried one.
		message: Option<String>,
		/// `Retry-After` hint, mostly present on 429 responses.
		retry_after: Option<Duration>,
	},
	/// A 2xx body did not match the expected response shape.
	#[error("Marketplace API returned a malformed response body.")]
	ResponseParse {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status of the response.
		status: u16,
	},
	/// The authorization callback carried a missing, expired, or mismatched `state`.
	#[error("Authorization state is missing, expired, or does not match.")]
	InvalidState,
	/// The request was rejected locally before reaching the network.
	#[error("Invalid request: {reason}.")]
	InvalidRequest {
		/// Human-readable reason.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the caller has to send the user through the authorization flow again.
	pub fn requires_reauthentication(&self) -> bool {
		matches!(self, Self::MissingCredential | Self::ExternalAuth { .. } | Self::AuthExpired { .. })
	}

	/// HTTP status associated with the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::ExternalAuth { status, .. } => *status,
			Self::RemoteApi { status, .. } | Self::ResponseParse { status, .. } => Some(*status),
			Self::AuthExpired { source } => source.status(),
			_ => None,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured endpoint is not a valid OAuth URL.
	#[error("Configured endpoint is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be used by the OAuth client.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Marketplace configuration failed validation.
	#[error(transparent)]
	Marketplace(#[from] crate::config::ConfigValidationError),
	/// Environment or file configuration could not be loaded.
	#[error("Configuration could not be loaded.")]
	Load(#[from] ::config::ConfigError),
	/// An identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// A request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// A header value could not be built.
	#[error("Header value is invalid.")]
	HeaderValue(#[from] oauth2::http::header::InvalidHeaderValue),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the marketplace.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the configured timeout.
	#[error("Request to the marketplace timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the marketplace.")]
	Io(#[from] std::io::Error),
	/// The transport failed without a structured error.
	#[error("HTTP client error occurred while calling the marketplace: {message}.")]
	Other {
		/// Transport-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auth_failures_require_reauthentication() {
		let expired = Error::AuthExpired {
			source: Box::new(Error::ExternalAuth { status: Some(400), reason: "Bad Request".into() }),
		};

		assert!(Error::MissingCredential.requires_reauthentication());
		assert!(expired.requires_reauthentication());
		assert_eq!(expired.status(), Some(400));
		assert!(
			!Error::RemoteApi {
				status: 404,
				status_text: "Not Found".into(),
				message: None,
				retry_after: None,
			}
			.requires_reauthentication()
		);
	}

	#[test]
	fn auth_expired_exposes_refresh_failure_as_source() {
		let expired = Error::AuthExpired {
			source: Box::new(Error::ExternalAuth { status: Some(401), reason: "Unauthorized".into() }),
		};
		let source = StdError::source(&expired).expect("AuthExpired should expose its cause.");

		assert!(source.to_string().contains("Unauthorized"));
	}
}
