//! Inbound marketplace notifications: header validation, envelope parsing, and topic routing.
//!
//! [`Dispatcher::handle_inbound`] turns one raw request into a [`WebhookReply`]. The provider
//! redelivers anything that is not answered with 200, so handler failures surface as 500 while
//! unknown topics are acknowledged. The dispatcher keeps no state between requests.

pub mod server;

pub use server::*;

// crates.io
use axum::{
	Json,
	http::{
		HeaderMap, StatusCode,
		header::{CONTENT_TYPE, USER_AGENT},
	},
	response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	config::MarketplaceConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Service name reported by the health document.
pub const SERVICE_NAME: &str = "melidash-webhooks";

/// Boxed future returned by [`TopicHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + 'a + Send>>;
/// Error type handlers report; any failure becomes a 500 so the provider redelivers.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Handler families notifications are routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
	/// Order lifecycle and feedback.
	Orders,
	/// Listing and price changes.
	Items,
	/// Buyer questions.
	Questions,
	/// Claims and disputes.
	Claims,
	/// Post-sale messages.
	Messages,
	/// Payment updates.
	Payments,
	/// Shipment updates.
	Shipments,
}
impl Topic {
	/// Every handler family, in health-document order.
	pub const ALL: [Topic; 7] = [
		Topic::Orders,
		Topic::Items,
		Topic::Questions,
		Topic::Claims,
		Topic::Messages,
		Topic::Payments,
		Topic::Shipments,
	];

	/// Maps a wire topic onto its handler family.
	pub fn from_wire(topic: &str) -> Option<Self> {
		match topic {
			"orders" | "orders_v2" | "orders_feedback" => Some(Topic::Orders),
			"items" | "items_prices" => Some(Topic::Items),
			"questions" => Some(Topic::Questions),
			"claims" => Some(Topic::Claims),
			"messages" => Some(Topic::Messages),
			"payments" => Some(Topic::Payments),
			"shipments" => Some(Topic::Shipments),
			_ => None,
		}
	}

	/// Stable label of the family.
	pub const fn as_str(self) -> &'static str {
		match self {
			Topic::Orders => "orders",
			Topic::Items => "items",
			Topic::Questions => "questions",
			Topic::Claims => "claims",
			Topic::Messages => "messages",
			Topic::Payments => "payments",
			Topic::Shipments => "shipments",
		}
	}
}
impl Display for Topic {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reasons an inbound body is not a usable notification.
#[derive(Debug, ThisError)]
pub enum EnvelopeError {
	/// The body is not a JSON object.
	#[error("Notification body is not valid JSON.")]
	InvalidJson(#[source] serde_json::Error),
	/// A required field is absent or empty.
	#[error("Notification field `{field}` is missing or empty.")]
	MissingField {
		/// Offending field.
		field: &'static str,
	},
	/// `user_id` is not a non-negative integer.
	#[error("Notification field `user_id` is not numeric.")]
	InvalidUserId,
}

/// Push notification as delivered by the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationEnvelope {
	/// Delivery identifier.
	#[serde(rename = "_id")]
	pub id: Option<String>,
	/// Resource path that changed, for example `/orders/2000001`.
	pub resource: String,
	/// Seller account the notification belongs to.
	pub user_id: u64,
	/// Wire topic as sent by the provider.
	pub topic: String,
	/// Application the subscription belongs to.
	pub application_id: Option<u64>,
	/// Delivery attempt counter.
	pub attempts: u32,
	/// When the provider sent this attempt.
	#[serde(with = "time::serde::rfc3339::option")]
	pub sent: Option<OffsetDateTime>,
	/// When the provider first received the event.
	#[serde(with = "time::serde::rfc3339::option")]
	pub received: Option<OffsetDateTime>,
}
impl NotificationEnvelope {
	/// Parses and validates a raw body.
	///
	/// `resource` and `topic` must be non-empty strings and `user_id` a non-negative integer
	/// (numeric strings are accepted). Unknown fields are ignored.
	pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
		let raw: RawEnvelope = serde_json::from_slice(body).map_err(EnvelopeError::InvalidJson)?;
		let resource = non_empty(raw.resource, "resource")?;
		let topic = non_empty(raw.topic, "topic")?;
		let user_id = match raw.user_id {
			None | Some(Value::Null) => return Err(EnvelopeError::MissingField { field: "user_id" }),
			Some(value) => as_u64(&value).ok_or(EnvelopeError::InvalidUserId)?,
		};

		Ok(Self {
			id: raw.id.and_then(|value| match value {
				Value::String(id) => Some(id),
				Value::Number(id) => Some(id.to_string()),
				_ => None,
			}),
			resource,
			user_id,
			topic,
			application_id: raw.application_id.as_ref().and_then(as_u64),
			attempts: raw
				.attempts
				.as_ref()
				.and_then(as_u64)
				.and_then(|attempts| u32::try_from(attempts).ok())
				.unwrap_or(0),
			sent: timestamp(raw.sent, "sent"),
			received: timestamp(raw.received, "received"),
		})
	}

	/// Handler family of the wire topic, if known.
	pub fn handler_topic(&self) -> Option<Topic> {
		Topic::from_wire(&self.topic)
	}
}

#[derive(Deserialize)]
struct RawEnvelope {
	#[serde(rename = "_id", default)]
	id: Option<Value>,
	#[serde(default)]
	resource: Option<String>,
	#[serde(default)]
	user_id: Option<Value>,
	#[serde(default)]
	topic: Option<String>,
	#[serde(default)]
	application_id: Option<Value>,
	#[serde(default)]
	attempts: Option<Value>,
	#[serde(default)]
	sent: Option<Value>,
	#[serde(default)]
	received: Option<Value>,
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, EnvelopeError> {
	match value {
		Some(value) if !value.trim().is_empty() => Ok(value),
		_ => Err(EnvelopeError::MissingField { field }),
	}
}

fn as_u64(value: &Value) -> Option<u64> {
	match value {
		Value::Number(number) => number.as_u64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

// Timestamps are informational; an unparseable one must not cost the provider a delivery.
fn timestamp(value: Option<Value>, field: &'static str) -> Option<OffsetDateTime> {
	let text = match value? {
		Value::Null => return None,
		Value::String(text) => text,
		other => other.to_string(),
	};

	match OffsetDateTime::parse(&text, &Rfc3339) {
		Ok(parsed) => Some(parsed),
		Err(err) => {
			tracing::debug!(field, value = %text, error = %err, "Ignoring non RFC 3339 timestamp.");

			None
		},
	}
}

/// Processes notifications of one [`Topic`].
pub trait TopicHandler
where
	Self: Send + Sync,
{
	/// Handles one notification. Errors make the provider redeliver it.
	fn handle<'a>(&'a self, notification: &'a NotificationEnvelope) -> HandlerFuture<'a>;
}

/// Default handler that only logs what arrived.
#[derive(Clone, Copy, Debug)]
pub struct LoggingHandler {
	topic: Topic,
}
impl LoggingHandler {
	/// Creates a logging handler for `topic`.
	pub fn new(topic: Topic) -> Self {
		Self { topic }
	}
}
impl TopicHandler for LoggingHandler {
	fn handle<'a>(&'a self, notification: &'a NotificationEnvelope) -> HandlerFuture<'a> {
		Box::pin(async move {
			tracing::info!(
				topic = %self.topic,
				wire_topic = %notification.topic,
				resource = %notification.resource,
				user_id = notification.user_id,
				attempts = notification.attempts,
				"Notification received."
			);

			Ok(())
		})
	}
}

/// HTTP status plus JSON body produced for one inbound request.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookReply {
	/// Status returned to the provider.
	pub status: StatusCode,
	/// JSON document returned to the provider.
	pub body: Value,
}
impl WebhookReply {
	fn ok() -> Self {
		Self { status: StatusCode::OK, body: json!({ "status": "ok" }) }
	}

	fn error(status: StatusCode, message: impl Display) -> Self {
		Self { status, body: json!({ "status": "error", "error": message.to_string() }) }
	}
}
impl IntoResponse for WebhookReply {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

/// Routes validated notifications to one handler per [`Topic`].
#[derive(Clone)]
pub struct Dispatcher {
	handlers: HashMap<Topic, Arc<dyn TopicHandler>>,
	user_agent_token: String,
}
impl Dispatcher {
	/// Creates a dispatcher with a [`LoggingHandler`] for every topic.
	///
	/// Requests are accepted only when their `User-Agent` contains `user_agent_token`
	/// (compared case-insensitively).
	pub fn new(user_agent_token: impl Into<String>) -> Self {
		let handlers = Topic::ALL
			.into_iter()
			.map(|topic| (topic, Arc::new(LoggingHandler::new(topic)) as Arc<dyn TopicHandler>))
			.collect();

		Self { handlers, user_agent_token: user_agent_token.into() }
	}

	/// Creates a dispatcher expecting the configured webhook `User-Agent` token.
	pub fn from_config(config: &MarketplaceConfig) -> Self {
		Self::new(config.webhook_user_agent.clone())
	}

	/// Replaces the handler for `topic`.
	pub fn with_handler(mut self, topic: Topic, handler: Arc<dyn TopicHandler>) -> Self {
		self.handlers.insert(topic, handler);

		self
	}

	/// Validates and dispatches one inbound request.
	///
	/// | condition | status |
	/// |---|---|
	/// | `User-Agent` missing or without the provider token | 401 |
	/// | `Content-Type` not JSON | 400 |
	/// | malformed envelope | 400 |
	/// | unknown topic | 200 (logged, no handler) |
	/// | handler error | 500 |
	/// | handled | 200 `{"status":"ok"}` |
	pub async fn handle_inbound(&self, headers: &HeaderMap, body: &[u8]) -> WebhookReply {
		const KIND: FlowKind = FlowKind::Webhook;

		let span = FlowSpan::new(KIND, "handle_inbound");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let (reply, outcome) = span.instrument(self.process(headers, body)).await;

		obs::record_flow_outcome(KIND, outcome);

		reply
	}

	/// Health document listing the supported wire topics' families.
	pub fn health(&self) -> Value {
		let topics = Topic::ALL.iter().map(|topic| topic.as_str()).collect::<Vec<_>>();

		json!({ "status": "ok", "service": SERVICE_NAME, "topics": topics })
	}

	async fn process(&self, headers: &HeaderMap, body: &[u8]) -> (WebhookReply, FlowOutcome) {
		if !self.user_agent_accepted(headers) {
			tracing::warn!("Rejected notification with an unexpected User-Agent.");

			return (
				WebhookReply::error(StatusCode::UNAUTHORIZED, "unrecognized user agent"),
				FlowOutcome::Failure,
			);
		}
		if !is_json_content_type(headers) {
			return (
				WebhookReply::error(StatusCode::BAD_REQUEST, "content type must be application/json"),
				FlowOutcome::Failure,
			);
		}

		let envelope = match NotificationEnvelope::parse(body) {
			Ok(envelope) => envelope,
			Err(err) => {
				tracing::warn!(error = %err, "Rejected malformed notification.");

				return (WebhookReply::error(StatusCode::BAD_REQUEST, err), FlowOutcome::Failure);
			},
		};
		let Some(handler) = envelope.handler_topic().and_then(|topic| self.handlers.get(&topic))
		else {
			tracing::warn!(
				topic = %envelope.topic,
				resource = %envelope.resource,
				"Acknowledging notification with an unknown topic."
			);

			return (WebhookReply::ok(), FlowOutcome::Success);
		};

		match handler.handle(&envelope).await {
			Ok(()) => (WebhookReply::ok(), FlowOutcome::Success),
			Err(err) => {
				tracing::error!(
					topic = %envelope.topic,
					resource = %envelope.resource,
					error = %err,
					"Notification handler failed."
				);

				(
					WebhookReply::error(StatusCode::INTERNAL_SERVER_ERROR, "handler failed"),
					FlowOutcome::Failure,
				)
			},
		}
	}

	fn user_agent_accepted(&self, headers: &HeaderMap) -> bool {
		headers
			.get(USER_AGENT)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|agent| agent.contains(self.user_agent_token.as_str()))
	}
}
impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut topics = self.handlers.keys().copied().collect::<Vec<_>>();

		topics.sort();

		f.debug_struct("Dispatcher")
			.field("topics", &topics)
			.field("user_agent_token", &self.user_agent_token)
			.finish()
	}
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
	let Some(value) = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()) else {
		return false;
	};
	let media_type = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

	media_type == "application/json" || media_type.ends_with("+json")
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::http::HeaderValue;
	// self
	use super::*;

	fn headers(agent: &str, content_type: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(USER_AGENT, HeaderValue::from_str(agent).expect("Agent should be valid."));
		headers.insert(
			CONTENT_TYPE,
			HeaderValue::from_str(content_type).expect("Content type should be valid."),
		);

		headers
	}

	#[test]
	fn wire_topics_map_onto_families() {
		assert_eq!(Topic::from_wire("orders_v2"), Some(Topic::Orders));
		assert_eq!(Topic::from_wire("orders_feedback"), Some(Topic::Orders));
		assert_eq!(Topic::from_wire("items_prices"), Some(Topic::Items));
		assert_eq!(Topic::from_wire("shipments"), Some(Topic::Shipments));
		assert_eq!(Topic::from_wire("Orders"), None);
		assert_eq!(Topic::from_wire("catalog"), None);
	}

	#[test]
	fn content_type_ignores_parameters_and_accepts_suffixes() {
		assert!(is_json_content_type(&headers("MercadoLibre/1.0", "application/json")));
		assert!(is_json_content_type(&headers("x", "application/json; charset=utf-8")));
		assert!(is_json_content_type(&headers("x", "application/vnd.ml+json")));
		assert!(!is_json_content_type(&headers("x", "text/plain")));
		assert!(!is_json_content_type(&HeaderMap::new()));
	}

	#[test]
	fn envelope_parsing_validates_required_fields() {
		let envelope = NotificationEnvelope::parse(
			br#"{"_id":"abc","resource":"/orders/1","user_id":"123","topic":"orders_v2","application_id":99,"attempts":2,"sent":"2024-05-01T10:00:00.000Z","received":"2024-05-01T09:59:59.000Z"}"#,
		)
		.expect("Envelope should parse.");

		assert_eq!(envelope.user_id, 123);
		assert_eq!(envelope.application_id, Some(99));
		assert_eq!(envelope.attempts, 2);
		assert_eq!(envelope.handler_topic(), Some(Topic::Orders));
		assert!(envelope.sent.is_some());

		assert!(matches!(
			NotificationEnvelope::parse(br#"{"resource":"","user_id":1,"topic":"items"}"#),
			Err(EnvelopeError::MissingField { field: "resource" })
		));
		assert!(matches!(
			NotificationEnvelope::parse(br#"{"resource":"/items/1","topic":"items"}"#),
			Err(EnvelopeError::MissingField { field: "user_id" })
		));
		assert!(matches!(
			NotificationEnvelope::parse(br#"{"resource":"/items/1","user_id":"seller","topic":"items"}"#),
			Err(EnvelopeError::InvalidUserId)
		));
		assert!(matches!(
			NotificationEnvelope::parse(b"not json"),
			Err(EnvelopeError::InvalidJson(_))
		));
	}

	#[test]
	fn malformed_timestamps_are_dropped_not_rejected() {
		let envelope = NotificationEnvelope::parse(
			br#"{"resource":"/orders/1","user_id":1,"topic":"orders_v2","sent":"2024-05-01 12:00:00","received":"2024-05-01T12:00:01Z"}"#,
		)
		.expect("Envelope with a loose `sent` should parse.");

		assert!(envelope.sent.is_none());
		assert!(envelope.received.is_some());

		let envelope = NotificationEnvelope::parse(
			br#"{"resource":"/orders/1","user_id":1,"topic":"orders_v2","sent":17,"received":null}"#,
		)
		.expect("Envelope with non-string timestamps should parse.");

		assert!(envelope.sent.is_none());
		assert!(envelope.received.is_none());
	}

	#[tokio::test]
	async fn user_agent_token_must_match_exactly() {
		let dispatcher = Dispatcher::new("MercadoLibre");
		let body = br#"{"resource":"/orders/1","user_id":1,"topic":"orders_v2"}"#;

		for agent in ["MERCADOLIBRE spoof", "mercadolibre-hooks", "Mercado Libre"] {
			let reply = dispatcher.handle_inbound(&headers(agent, "application/json"), body).await;

			assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{agent} should be rejected.");
		}

		let reply = dispatcher
			.handle_inbound(&headers("MercadoLibre Notifications/1.0", "application/json"), body)
			.await;

		assert_eq!(reply.status, StatusCode::OK);
	}

	#[tokio::test]
	async fn user_agent_check_runs_before_content_type() {
		let dispatcher = Dispatcher::new("MercadoLibre");
		let reply = dispatcher.handle_inbound(&headers("curl/8.0", "text/plain"), b"{}").await;

		assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

		let reply = dispatcher.handle_inbound(&headers("MercadoLibre/1.0", "text/plain"), b"{}").await;

		assert_eq!(reply.status, StatusCode::BAD_REQUEST);
	}

	#[test]
	fn health_lists_every_family() {
		let health = Dispatcher::new("MercadoLibre").health();

		assert_eq!(health["service"], SERVICE_NAME);
		assert_eq!(health["topics"].as_array().map(Vec::len), Some(Topic::ALL.len()));
	}
}
