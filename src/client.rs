//! Authenticated request executor for marketplace resource endpoints.
//!
//! Every call carries the manager's current bearer token. A 401 triggers one refresh through
//! the manager's single-flight guard followed by exactly one retry; whatever the retry returns
//! is final. Any other non-success status is surfaced as [`Error::RemoteApi`].

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest, HttpResponse,
	http::{
		HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	flows::TokenManager,
	http::{self, MarketplaceHttpClient, ResponseMetadataSlot},
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Number of refresh-and-retry cycles a single call may perform after a 401.
pub const MAX_AUTH_RETRIES: usize = 1;

const JSON: &str = "application/json";

/// Outbound request description, relative to the configured API base.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request for `method` on `path` (for example `/users/me`).
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: HeaderMap::new(),
			body: None,
		}
	}

	/// Creates a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Creates a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Creates a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Creates a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}

	/// Appends a query parameter when `value` is present.
	pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
		match value {
			Some(value) => self.query(key, value),
			None => self,
		}
	}

	/// Sets a header. `Authorization` is always replaced by the executor.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body).map_err(ConfigError::RequestBody)?);

		Ok(self)
	}

	/// HTTP method of the request.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path relative to the API base.
	pub fn path(&self) -> &str {
		&self.path
	}
}

/// Executes [`ApiRequest`]s on behalf of one [`TokenManager`].
pub struct ApiClient<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	manager: Arc<TokenManager<C, M>>,
}
impl<C, M> ApiClient<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an executor sharing the manager's transport and credentials.
	pub fn new(manager: Arc<TokenManager<C, M>>) -> Self {
		Self { manager }
	}

	/// Token manager backing this client.
	pub fn manager(&self) -> &Arc<TokenManager<C, M>> {
		&self.manager
	}

	/// Executes `request` and deserializes the success body into `T`.
	///
	/// An empty success body is read as JSON `null`, so `()` and `Option<_>` targets accept it.
	pub async fn call<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		const KIND: FlowKind = FlowKind::ApiCall;

		let span = FlowSpan::new(KIND, "call");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let response = self.execute(&request).await?;

				decode(&request, response)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Untyped form of [`ApiClient::call`].
	pub async fn call_raw(&self, request: ApiRequest) -> Result<serde_json::Value> {
		self.call(request).await
	}

	async fn execute(&self, request: &ApiRequest) -> Result<HttpResponse> {
		let snapshot = self.manager.snapshot();
		let mut access_token = snapshot.access_token.ok_or(Error::MissingCredential)?;
		let mut retries = 0;

		loop {
			let response = self.send(request, &access_token).await?;

			if response.status() != StatusCode::UNAUTHORIZED || retries == MAX_AUTH_RETRIES {
				return Ok(response);
			}

			retries += 1;

			tracing::info!(
				method = %request.method,
				path = %request.path,
				"Access token was rejected; refreshing before retrying once."
			);

			match self.manager.refresh_since(snapshot.epoch).await {
				Ok(pair) => access_token = pair.access_token,
				Err(source) => return Err(Error::AuthExpired { source: Box::new(source) }),
			}
		}
	}

	async fn send(&self, request: &ApiRequest, access_token: &TokenSecret) -> Result<HttpResponse> {
		let http_request = self.build(request, access_token)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.manager.http_client.with_metadata(slot.clone());
		let response = handle.call(http_request).await.map_err(|err| {
			self.manager.transport_mapper.map_transport_error(
				FlowKind::ApiCall,
				slot.take().as_ref(),
				err,
			)
		})?;

		tracing::debug!(
			method = %request.method,
			path = %request.path,
			status = response.status().as_u16(),
			"Marketplace responded."
		);

		Ok(response)
	}

	fn build(&self, request: &ApiRequest, access_token: &TokenSecret) -> Result<HttpRequest> {
		let mut url = crate::config::join_base(&self.manager.config().api_base, &request.path)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		let mut headers = request.headers.clone();
		let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token.expose()))
			.map_err(ConfigError::from)?;

		bearer.set_sensitive(true);
		headers.insert(AUTHORIZATION, bearer);

		if !headers.contains_key(ACCEPT) {
			headers.insert(ACCEPT, HeaderValue::from_static(JSON));
		}
		if request.body.is_some() && !headers.contains_key(CONTENT_TYPE) {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
		}

		let mut http_request = oauth2::http::Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.body(request.body.clone().unwrap_or_default())
			.map_err(ConfigError::from)?;

		*http_request.headers_mut() = headers;

		Ok(http_request)
	}
}
impl<C, M> Clone for ApiClient<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { manager: self.manager.clone() }
	}
}
impl<C, M> Debug for ApiClient<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient").field("manager", &self.manager).finish()
	}
}

#[derive(Deserialize)]
struct ErrorBody {
	#[serde(default)]
	message: Option<String>,
}

fn decode<T>(request: &ApiRequest, response: HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status().as_u16();
	let body = response.body();

	if !response.status().is_success() {
		let message = serde_json::from_slice::<ErrorBody>(body).ok().and_then(|body| body.message);

		tracing::debug!(method = %request.method, path = %request.path, status, "Call failed.");

		return Err(Error::RemoteApi {
			status,
			status_text: oauth::status_text(status),
			message,
			retry_after: http::parse_retry_after(response.headers()),
		});
	}

	let payload: &[u8] =
		if body.iter().all(u8::is_ascii_whitespace) { b"null" } else { body.as_slice() };
	let mut deserializer = serde_json::Deserializer::from_slice(payload);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::ResponseParse { source, status })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Status fixture should be valid.");

		response
	}

	#[test]
	fn empty_success_body_reads_as_null() {
		let request = ApiRequest::put("/items/MLA1");
		let decoded: Option<serde_json::Value> =
			decode(&request, response(200, "")).expect("Empty body should decode.");

		assert!(decoded.is_none());

		decode::<()>(&request, response(204, " \n")).expect("Whitespace body should decode as unit.");
	}

	#[test]
	fn error_body_message_is_surfaced() {
		let request = ApiRequest::get("/items/MLA404");
		let err = decode::<serde_json::Value>(
			&request,
			response(404, "{\"message\":\"Item with id MLA404 not found\",\"status\":404}"),
		)
		.expect_err("404 should be an error.");

		assert!(matches!(
			err,
			Error::RemoteApi { status: 404, ref status_text, message: Some(ref message), .. }
				if status_text == "Not Found" && message.contains("MLA404")
		));
	}

	#[test]
	fn parse_failures_carry_the_json_path() {
		#[derive(Debug, Deserialize)]
		struct User {
			#[allow(dead_code)]
			id: u64,
		}

		let request = ApiRequest::get("/users/me");
		let err = decode::<User>(&request, response(200, "{\"id\":\"not-a-number\"}"))
			.expect_err("Mismatched types should fail.");

		match err {
			Error::ResponseParse { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "id");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn request_builder_collects_parts() {
		let request = ApiRequest::get("/users/1/items/search")
			.query("status", "active")
			.query_opt("offset", None::<u32>)
			.query_opt("limit", Some(50))
			.header(HeaderName::from_static("x-trace"), HeaderValue::from_static("abc"));

		assert_eq!(request.method(), Method::GET);
		assert_eq!(request.path(), "/users/1/items/search");
		assert_eq!(request.query, vec![
			("status".to_owned(), "active".to_owned()),
			("limit".to_owned(), "50".to_owned())
		]);
		assert_eq!(request.headers.get("x-trace"), Some(&HeaderValue::from_static("abc")));
	}
}
