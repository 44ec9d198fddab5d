//! Marketplace application configuration: OAuth client credentials, endpoint bases, and
//! transport limits.
//!
//! Values are validated when built so flows can rely on HTTPS endpoints and a positive
//! request timeout. Loopback hosts may use plain HTTP, which keeps local development and mock
//! servers usable.

// self
use crate::{_prelude::*, auth::SiteId, error::ConfigError};

const DEFAULT_AUTH_BASE: &str = "https://auth.mercadolibre.com.ar";
const DEFAULT_API_BASE: &str = "https://api.mercadolibre.com";
const DEFAULT_SITE: &str = "MLA";
const DEFAULT_SCOPE: &str = "read write offline_access";
const DEFAULT_WEBHOOK_USER_AGENT: &str = "MercadoLibre";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_STATE_TTL_SECS: u64 = 600;
/// Longest lifetime a pending authorization state may be given (one day).
pub const MAX_STATE_TTL_SECS: u64 = 86_400;
const ENV_PREFIX: &str = "MELIDASH";

/// Errors raised while validating a [`MarketplaceConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigValidationError {
	/// A required value was empty.
	#[error("The `{field}` setting is required.")]
	Missing {
		/// Offending setting name.
		field: &'static str,
	},
	/// Endpoints must use HTTPS (loopback hosts excepted).
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint bases cannot carry query strings or fragments.
	#[error("The {endpoint} endpoint cannot carry a query or fragment: {url}.")]
	DecoratedEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Durations must be positive.
	#[error("The `{field}` setting must be greater than zero.")]
	NonPositiveDuration {
		/// Offending setting name.
		field: &'static str,
	},
	/// A duration exceeds its ceiling.
	#[error("The `{field}` setting must not exceed {max_secs} seconds.")]
	DurationTooLong {
		/// Offending setting name.
		field: &'static str,
		/// Largest accepted value.
		max_secs: u64,
	},
}

/// Validated marketplace settings shared by the token manager, the API client, and the webhook
/// dispatcher.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
	/// OAuth application identifier.
	pub client_id: String,
	/// OAuth application secret; never logged.
	pub client_secret: String,
	/// Redirect URI registered with the application.
	pub redirect_uri: Url,
	/// Base of the authorization server (`{auth_base}/authorization`).
	#[serde(default = "default_auth_base")]
	pub auth_base: Url,
	/// Base of the resource API and token endpoint (`{api_base}/oauth/token`).
	#[serde(default = "default_api_base")]
	pub api_base: Url,
	/// Default marketplace site.
	#[serde(default = "default_site")]
	pub site: SiteId,
	/// Space-delimited scope string requested during authorization.
	#[serde(default = "default_scope")]
	pub scope: String,
	/// Upper bound for each outbound HTTP request.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Lifetime of a pending authorization `state`.
	#[serde(default = "default_state_ttl_secs")]
	pub state_ttl_secs: u64,
	/// Adds an S256 PKCE challenge to authorization requests.
	#[serde(default)]
	pub pkce: bool,
	/// Token that inbound webhook `User-Agent` headers must contain.
	#[serde(default = "default_webhook_user_agent")]
	pub webhook_user_agent: String,
}
impl MarketplaceConfig {
	/// Creates a new builder for the provided client credentials.
	pub fn builder(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> MarketplaceConfigBuilder {
		MarketplaceConfigBuilder::new(client_id, client_secret)
	}

	/// Loads `MELIDASH_*` environment variables (for example `MELIDASH_CLIENT_ID`) and
	/// validates the result.
	pub fn from_env() -> Result<Self> {
		let config: Self = ::config::Config::builder()
			.add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
			.build()
			.map_err(ConfigError::from)?
			.try_deserialize()
			.map_err(ConfigError::from)?;

		config.validate().map_err(ConfigError::from)?;

		Ok(config)
	}

	/// Token endpoint derived from the API base.
	pub fn token_endpoint(&self) -> Result<Url> {
		join_base(&self.api_base, "oauth/token")
	}

	/// Authorization endpoint derived from the authorization base.
	pub fn authorization_endpoint(&self) -> Result<Url> {
		join_base(&self.auth_base, "authorization")
	}

	/// Site used by the catalog helpers when the caller does not name one.
	pub fn default_site(&self) -> &SiteId {
		&self.site
	}

	/// Per-request timeout as a standard duration.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}

	/// Lifetime of pending authorization states, capped at [`MAX_STATE_TTL_SECS`].
	pub fn state_ttl(&self) -> Duration {
		let secs = self.state_ttl_secs.min(MAX_STATE_TTL_SECS);

		Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
	}

	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), ConfigValidationError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigValidationError::Missing { field: "client_id" });
		}
		if self.client_secret.trim().is_empty() {
			return Err(ConfigValidationError::Missing { field: "client_secret" });
		}
		if self.scope.trim().is_empty() {
			return Err(ConfigValidationError::Missing { field: "scope" });
		}
		if self.webhook_user_agent.trim().is_empty() {
			return Err(ConfigValidationError::Missing { field: "webhook_user_agent" });
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigValidationError::NonPositiveDuration {
				field: "request_timeout_secs",
			});
		}
		if self.state_ttl_secs == 0 {
			return Err(ConfigValidationError::NonPositiveDuration { field: "state_ttl_secs" });
		}
		if self.state_ttl_secs > MAX_STATE_TTL_SECS {
			return Err(ConfigValidationError::DurationTooLong {
				field: "state_ttl_secs",
				max_secs: MAX_STATE_TTL_SECS,
			});
		}

		validate_endpoint("authorization", &self.auth_base)?;
		validate_endpoint("api", &self.api_base)?;
		validate_endpoint("redirect", &self.redirect_uri)?;

		Ok(())
	}
}
impl Debug for MarketplaceConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MarketplaceConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("auth_base", &self.auth_base.as_str())
			.field("api_base", &self.api_base.as_str())
			.field("site", &self.site)
			.field("scope", &self.scope)
			.field("request_timeout_secs", &self.request_timeout_secs)
			.field("state_ttl_secs", &self.state_ttl_secs)
			.field("pkce", &self.pkce)
			.field("webhook_user_agent", &self.webhook_user_agent)
			.finish()
	}
}

/// Builder for [`MarketplaceConfig`] values.
#[derive(Debug)]
pub struct MarketplaceConfigBuilder {
	client_id: String,
	client_secret: String,
	redirect_uri: Option<Url>,
	auth_base: Option<Url>,
	api_base: Option<Url>,
	site: Option<SiteId>,
	scope: Option<String>,
	request_timeout_secs: u64,
	state_ttl_secs: u64,
	pkce: bool,
	webhook_user_agent: Option<String>,
}
impl MarketplaceConfigBuilder {
	fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			redirect_uri: None,
			auth_base: None,
			api_base: None,
			site: None,
			scope: None,
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			state_ttl_secs: DEFAULT_STATE_TTL_SECS,
			pkce: false,
			webhook_user_agent: None,
		}
	}

	/// Sets the redirect URI registered with the application.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Overrides the authorization server base.
	pub fn auth_base(mut self, url: Url) -> Self {
		self.auth_base = Some(url);

		self
	}

	/// Overrides the API base.
	pub fn api_base(mut self, url: Url) -> Self {
		self.api_base = Some(url);

		self
	}

	/// Overrides the default site.
	pub fn site(mut self, site: SiteId) -> Self {
		self.site = Some(site);

		self
	}

	/// Overrides the requested scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Overrides the per-request timeout.
	pub fn request_timeout_secs(mut self, secs: u64) -> Self {
		self.request_timeout_secs = secs;

		self
	}

	/// Overrides the pending-state lifetime.
	pub fn state_ttl_secs(mut self, secs: u64) -> Self {
		self.state_ttl_secs = secs;

		self
	}

	/// Enables or disables PKCE on authorization requests.
	pub fn pkce(mut self, enabled: bool) -> Self {
		self.pkce = enabled;

		self
	}

	/// Overrides the provider token expected in webhook `User-Agent` headers.
	pub fn webhook_user_agent(mut self, token: impl Into<String>) -> Self {
		self.webhook_user_agent = Some(token.into());

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<MarketplaceConfig, ConfigValidationError> {
		let redirect_uri =
			self.redirect_uri.ok_or(ConfigValidationError::Missing { field: "redirect_uri" })?;
		let config = MarketplaceConfig {
			client_id: self.client_id,
			client_secret: self.client_secret,
			redirect_uri,
			auth_base: self.auth_base.unwrap_or_else(default_auth_base),
			api_base: self.api_base.unwrap_or_else(default_api_base),
			site: self.site.unwrap_or_else(default_site),
			scope: self.scope.unwrap_or_else(default_scope),
			request_timeout_secs: self.request_timeout_secs,
			state_ttl_secs: self.state_ttl_secs,
			pkce: self.pkce,
			webhook_user_agent: self.webhook_user_agent.unwrap_or_else(default_webhook_user_agent),
		};

		config.validate()?;

		Ok(config)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigValidationError> {
	if name != "redirect" && (url.query().is_some() || url.fragment().is_some()) {
		return Err(ConfigValidationError::DecoratedEndpoint { endpoint: name, url: url.to_string() });
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigValidationError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
		Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
		None => false,
	}
}

/// Appends `suffix` to the path of `base`, keeping any path prefix the base carries.
pub(crate) fn join_base(base: &Url, suffix: &str) -> Result<Url> {
	let joined = format!(
		"{}/{}",
		base.as_str().trim_end_matches('/'),
		suffix.trim_start_matches('/')
	);

	Url::parse(&joined).map_err(|source| ConfigError::InvalidEndpoint { source }.into())
}

// The default constants are known to parse.
fn default_auth_base() -> Url {
	Url::parse(DEFAULT_AUTH_BASE).expect("Default authorization base must parse.")
}

fn default_api_base() -> Url {
	Url::parse(DEFAULT_API_BASE).expect("Default API base must parse.")
}

fn default_site() -> SiteId {
	SiteId::new(DEFAULT_SITE).expect("Default site must be a valid identifier.")
}

fn default_scope() -> String {
	DEFAULT_SCOPE.into()
}

fn default_request_timeout_secs() -> u64 {
	DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_state_ttl_secs() -> u64 {
	DEFAULT_STATE_TTL_SECS
}

fn default_webhook_user_agent() -> String {
	DEFAULT_WEBHOOK_USER_AGENT.into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse URL fixture.")
	}

	#[test]
	fn builder_applies_marketplace_defaults() {
		let config = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("https://dash.example.com/api/auth/callback"))
			.build()
			.expect("Configuration with defaults should be valid.");

		assert_eq!(config.scope, "read write offline_access");
		assert_eq!(config.site.as_ref(), "MLA");
		assert_eq!(config.request_timeout(), std::time::Duration::from_secs(15));
		assert_eq!(
			config.token_endpoint().expect("Token endpoint should derive.").as_str(),
			"https://api.mercadolibre.com/oauth/token"
		);
		assert_eq!(
			config.authorization_endpoint().expect("Authorization endpoint should derive.").as_str(),
			"https://auth.mercadolibre.com.ar/authorization"
		);
		assert!(!format!("{config:?}").contains("app-secret"));
	}

	#[test]
	fn builder_rejects_insecure_and_missing_values() {
		let err = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("https://dash.example.com/cb"))
			.api_base(url("http://api.example.com"))
			.build()
			.expect_err("Plain HTTP endpoints on public hosts must be rejected.");

		assert!(matches!(err, ConfigValidationError::InsecureEndpoint { endpoint: "api", .. }));

		let err = MarketplaceConfig::builder("", "app-secret")
			.redirect_uri(url("https://dash.example.com/cb"))
			.build()
			.expect_err("Empty client identifiers must be rejected.");

		assert_eq!(err, ConfigValidationError::Missing { field: "client_id" });

		let err = MarketplaceConfig::builder("app-id", "app-secret")
			.build()
			.expect_err("Redirect URI is required.");

		assert_eq!(err, ConfigValidationError::Missing { field: "redirect_uri" });

		let err = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("https://dash.example.com/cb"))
			.request_timeout_secs(0)
			.build()
			.expect_err("Zero timeouts must be rejected.");

		assert_eq!(err, ConfigValidationError::NonPositiveDuration {
			field: "request_timeout_secs"
		});
	}

	#[test]
	fn oversized_state_ttl_is_rejected_and_capped() {
		let err = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("https://dash.example.com/cb"))
			.state_ttl_secs(u64::MAX)
			.build()
			.expect_err("Unbounded state lifetimes must be rejected.");

		assert_eq!(err, ConfigValidationError::DurationTooLong {
			field: "state_ttl_secs",
			max_secs: MAX_STATE_TTL_SECS,
		});

		let mut config = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("https://dash.example.com/cb"))
			.state_ttl_secs(MAX_STATE_TTL_SECS)
			.build()
			.expect("A one-day lifetime should be accepted.");

		assert_eq!(config.state_ttl(), Duration::days(1));

		config.state_ttl_secs = u64::MAX;

		assert_eq!(config.state_ttl(), Duration::days(1));
	}

	#[test]
	fn loopback_hosts_may_use_http() {
		let config = MarketplaceConfig::builder("app-id", "app-secret")
			.redirect_uri(url("http://localhost:3000/cb"))
			.api_base(url("http://127.0.0.1:8080/mock"))
			.build()
			.expect("Loopback endpoints should be accepted.");

		assert_eq!(
			config.token_endpoint().expect("Token endpoint should derive.").as_str(),
			"http://127.0.0.1:8080/mock/oauth/token"
		);
	}

	#[test]
	fn deserializes_with_defaults() {
		let config: MarketplaceConfig = serde_json::from_str(
			"{\"client_id\":\"id\",\"client_secret\":\"secret\",\"redirect_uri\":\"https://dash.example.com/cb\",\"pkce\":true}",
		)
		.expect("Configuration should deserialize from JSON.");

		assert!(config.pkce);
		assert_eq!(config.webhook_user_agent, "MercadoLibre");
		assert_eq!(config.state_ttl(), Duration::minutes(10));
		assert!(config.validate().is_ok());
	}
}
