//! Marketplace endpoint operations layered on [`ApiClient::call`].
//!
//! Each operation only shapes the request and picks the response model; authentication,
//! the 401 refresh-and-retry cycle, and error classification come from the executor.

pub mod model;

pub use model::*;

use model::AnswerRequest;

// self
use crate::{
	_prelude::*,
	auth::{CategoryId, ItemId, SiteId},
	client::{ApiClient, ApiRequest},
	http::MarketplaceHttpClient,
	oauth::TransportErrorMapper,
};

impl<C, M> ApiClient<C, M>
where
	C: ?Sized + MarketplaceHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// `GET /users/me`
	pub async fn get_user_info(&self) -> Result<User> {
		self.call(ApiRequest::get("/users/me")).await
	}

	/// `GET /users/{user_id}/items/search`
	pub async fn list_my_products(&self, user_id: u64, query: &ListingQuery) -> Result<ListingPage> {
		let request = ApiRequest::get(format!("/users/{user_id}/items/search"))
			.query_opt("status", query.status.map(ItemStatus::as_str));

		self.call(with_page(request, query.page)).await
	}

	/// `GET /items/{item_id}`
	pub async fn get_item(&self, item_id: &ItemId) -> Result<Item> {
		self.call(ApiRequest::get(format!("/items/{item_id}"))).await
	}

	/// `PUT /items/{item_id}` with only the fields set in `update`.
	pub async fn update_product(&self, item_id: &ItemId, update: &ItemUpdate) -> Result<Item> {
		let request = ApiRequest::put(format!("/items/{item_id}")).json(update)?;

		self.call(request).await
	}

	/// Pauses a listing.
	pub async fn pause_product(&self, item_id: &ItemId) -> Result<Item> {
		self.update_product(item_id, &ItemUpdate::status(ItemStatus::Paused)).await
	}

	/// Reactivates a paused listing.
	pub async fn activate_product(&self, item_id: &ItemId) -> Result<Item> {
		self.update_product(item_id, &ItemUpdate::status(ItemStatus::Active)).await
	}

	/// `GET /orders/search/recent?seller={seller_id}`
	pub async fn get_orders(&self, seller_id: u64, query: &OrderQuery) -> Result<OrderPage> {
		let request = ApiRequest::get("/orders/search/recent")
			.query("seller", seller_id)
			.query_opt("order.status", query.status.as_deref());

		self.call(with_page(request, query.page)).await
	}

	/// Searches questions on one listing, or across the seller's received questions when the
	/// query names no listing.
	pub async fn get_questions(&self, query: &QuestionQuery) -> Result<QuestionPage> {
		let request = match &query.item {
			Some(item) => ApiRequest::get("/questions/search").query("item", item),
			None => ApiRequest::get("/my/received_questions/search"),
		}
		.query_opt("status", query.status.as_deref());

		self.call(with_page(request, query.page)).await
	}

	/// `POST /answers`
	///
	/// Blank answers are rejected with [`Error::InvalidRequest`] before any request is made.
	pub async fn answer_question(&self, question_id: u64, text: &str) -> Result<Question> {
		let text = text.trim();

		if text.is_empty() {
			return Err(Error::InvalidRequest { reason: "answer text is empty".into() });
		}

		let request = ApiRequest::post("/answers").json(&AnswerRequest { question_id, text })?;

		self.call(request).await
	}

	/// `GET /users/{user_id}/reputation`
	pub async fn get_reputation(&self, user_id: u64) -> Result<Reputation> {
		self.call(ApiRequest::get(format!("/users/{user_id}/reputation"))).await
	}

	/// `GET /sites/{site}/search?q={query}`
	pub async fn search_site(
		&self,
		site: &SiteId,
		query: &str,
		page: PageRequest,
	) -> Result<SearchPage> {
		let request = ApiRequest::get(format!("/sites/{site}/search")).query("q", query);

		self.call(with_page(request, page)).await
	}

	/// [`ApiClient::search_site`] against the configured default site.
	pub async fn search(&self, query: &str, page: PageRequest) -> Result<SearchPage> {
		let site = self.manager().config().default_site().clone();

		self.search_site(&site, query, page).await
	}

	/// [`ApiClient::list_categories`] for the configured default site.
	pub async fn list_default_categories(&self) -> Result<Vec<Category>> {
		let site = self.manager().config().default_site().clone();

		self.list_categories(&site).await
	}

	/// `GET /sites/{site}/categories`
	pub async fn list_categories(&self, site: &SiteId) -> Result<Vec<Category>> {
		self.call(ApiRequest::get(format!("/sites/{site}/categories"))).await
	}

	/// `GET /trends/{site}/{category}`
	pub async fn get_trends(&self, site: &SiteId, category: &CategoryId) -> Result<Vec<Trend>> {
		self.call(ApiRequest::get(format!("/trends/{site}/{category}"))).await
	}
}

fn with_page(request: ApiRequest, page: PageRequest) -> ApiRequest {
	request.query_opt("offset", page.offset).query_opt("limit", page.limit)
}
