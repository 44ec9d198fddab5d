//! Credential pair held by a token manager, with redacted secret formatting.

// self
use crate::_prelude::*;

/// Redacted wrapper keeping bearer and refresh secrets out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(<redacted>)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access and refresh token issued for one marketplace account.
///
/// A pair is replaced as a whole; the manager never updates one half in place. No expiry
/// is tracked, an expired access token is discovered when a call answers 401.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Bearer credential for resource calls.
	pub access_token: TokenSecret,
	/// Credential used to mint a new access token, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
}
impl TokenPair {
	/// Creates a pair carrying both secrets.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: Some(TokenSecret::new(refresh_token)),
		}
	}

	/// Creates a pair without a refresh token; such a pair cannot be refreshed.
	pub fn access_only(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None }
	}

	/// Returns `true` if the pair can be refreshed.
	pub fn is_refreshable(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Returns a copy whose refresh token falls back to `previous` when this pair has none.
	pub(crate) fn or_refresh_from(mut self, previous: Option<&TokenSecret>) -> Self {
		if self.refresh_token.is_none() {
			self.refresh_token = previous.cloned();
		}

		self
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Connection lifecycle observed by a token manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	/// No tokens are held.
	Unauthenticated,
	/// A token pair is held (it may still turn out to be expired).
	Authenticated,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_redact_secrets() {
		let pair = TokenPair::new("APP_USR-access", "TG-refresh");
		let rendered = format!("{pair:?} {}", pair.access_token);

		assert!(!rendered.contains("APP_USR-access"));
		assert!(!rendered.contains("TG-refresh"));
		assert_eq!(format!("{:?}", pair.access_token), "TokenSecret(<redacted>)");
	}

	#[test]
	fn refresh_fallback_only_fills_missing_secret() {
		let previous = TokenSecret::new("old-refresh");
		let kept = TokenPair::access_only("new-access").or_refresh_from(Some(&previous));

		assert_eq!(kept.refresh_token.as_ref().map(TokenSecret::expose), Some("old-refresh"));

		let rotated = TokenPair::new("new-access", "new-refresh").or_refresh_from(Some(&previous));

		assert_eq!(rotated.refresh_token.as_ref().map(TokenSecret::expose), Some("new-refresh"));
	}

	#[test]
	fn pair_serializes_secrets_transparently() {
		let pair = TokenPair::new("a", "r");
		let json = serde_json::to_string(&pair).expect("Token pair should serialize.");

		assert_eq!(json, "{\"access_token\":\"a\",\"refresh_token\":\"r\"}");
	}
}
