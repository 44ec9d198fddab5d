//! Response and request models for marketplace resource endpoints.
//!
//! Models are lenient: optional provider data defaults when absent and unknown fields are
//! ignored, so additive changes on the provider side do not break deserialization.

// self
use crate::{
	_prelude::*,
	auth::{CategoryId, ItemId},
};

/// Pagination block returned by search endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paging {
	/// Total number of matches.
	pub total: u64,
	/// Offset of the first returned entry.
	pub offset: u64,
	/// Page size applied by the provider.
	pub limit: u64,
}

/// Optional paging parameters sent with list requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
	/// Offset of the first entry.
	pub offset: Option<u32>,
	/// Maximum number of entries.
	pub limit: Option<u32>,
}

/// Authenticated seller account (`GET /users/me`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
	/// Numeric account identifier.
	pub id: u64,
	/// Public nickname.
	#[serde(default)]
	pub nickname: String,
	/// Given name.
	#[serde(default)]
	pub first_name: Option<String>,
	/// Family name.
	#[serde(default)]
	pub last_name: Option<String>,
	/// Contact email, when the scope grants it.
	#[serde(default)]
	pub email: Option<String>,
	/// Country code, for example `AR`.
	#[serde(default)]
	pub country_id: Option<String>,
	/// Home site, for example `MLA`.
	#[serde(default)]
	pub site_id: Option<String>,
	/// Public profile URL.
	#[serde(default)]
	pub permalink: Option<String>,
	/// Reputation summary embedded in the profile.
	#[serde(default)]
	pub seller_reputation: Option<Reputation>,
}

/// Lifecycle status of a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
	/// Published and purchasable.
	Active,
	/// Temporarily hidden by the seller.
	Paused,
	/// Finished; cannot be reactivated.
	Closed,
	/// Held by marketplace moderation.
	UnderReview,
	/// Inactive, pending seller action.
	Inactive,
	/// Any status this crate does not know about.
	#[serde(other)]
	Unknown,
}
impl ItemStatus {
	/// Wire label of the status.
	pub const fn as_str(self) -> &'static str {
		match self {
			ItemStatus::Active => "active",
			ItemStatus::Paused => "paused",
			ItemStatus::Closed => "closed",
			ItemStatus::UnderReview => "under_review",
			ItemStatus::Inactive => "inactive",
			ItemStatus::Unknown => "unknown",
		}
	}
}
impl Display for ItemStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Marketplace listing (`GET /items/{id}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
	/// Marketplace identifier.
	pub id: ItemId,
	/// Listing title.
	#[serde(default)]
	pub title: String,
	/// Unit price.
	#[serde(default)]
	pub price: f64,
	/// ISO currency, for example `ARS`.
	#[serde(default)]
	pub currency_id: Option<String>,
	/// Stock available for sale.
	#[serde(default)]
	pub available_quantity: i64,
	/// Units sold so far.
	#[serde(default)]
	pub sold_quantity: i64,
	/// Provider status label.
	#[serde(default)]
	pub status: Option<ItemStatus>,
	/// Leaf category.
	#[serde(default)]
	pub category_id: Option<String>,
	/// Public URL.
	#[serde(default)]
	pub permalink: Option<String>,
	/// Thumbnail image URL.
	#[serde(default)]
	pub thumbnail: Option<String>,
}

/// Partial listing update (`PUT /items/{id}`); unset fields are omitted from the body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ItemUpdate {
	/// Listing title.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Unit price.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub price: Option<f64>,
	/// Stock available for sale.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub available_quantity: Option<u32>,
	/// Provider status label.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<ItemStatus>,
}
impl ItemUpdate {
	/// Update that only changes the listing status.
	pub fn status(status: ItemStatus) -> Self {
		Self { status: Some(status), ..Default::default() }
	}
}

/// Filters for the seller's listing search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListingQuery {
	/// Restricts results to one status.
	pub status: Option<ItemStatus>,
	/// Paging parameters.
	pub page: PageRequest,
}

/// Listing identifiers owned by a seller (`GET /users/{id}/items/search`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingPage {
	/// Seller the listings belong to.
	pub seller_id: Option<String>,
	/// Listing identifiers.
	pub results: Vec<String>,
	/// Pagination block.
	pub paging: Paging,
}

/// Filters for the seller's recent orders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderQuery {
	/// Restricts results to one order status (for example `paid`).
	pub status: Option<String>,
	/// Paging parameters.
	pub page: PageRequest,
}

/// Buyer summary attached to an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Buyer {
	/// Marketplace identifier.
	pub id: u64,
	/// Public nickname.
	pub nickname: Option<String>,
}

/// Listing reference inside an order line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItemRef {
	/// Marketplace identifier.
	pub id: String,
	/// Listing title.
	pub title: String,
}

/// One line of an order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItem {
	/// Listing bought.
	pub item: OrderItemRef,
	/// Units bought.
	pub quantity: u32,
	/// Price per unit.
	pub unit_price: f64,
}

/// Marketplace order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Marketplace identifier.
	pub id: u64,
	/// Provider status label.
	#[serde(default)]
	pub status: String,
	/// Creation instant.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub date_created: Option<OffsetDateTime>,
	/// Order total.
	#[serde(default)]
	pub total_amount: f64,
	/// ISO currency code.
	#[serde(default)]
	pub currency_id: Option<String>,
	/// Buyer summary.
	#[serde(default)]
	pub buyer: Option<Buyer>,
	/// Order lines.
	#[serde(default)]
	pub order_items: Vec<OrderItem>,
}

/// Recent orders page (`GET /orders/search/recent`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderPage {
	/// Page entries.
	pub results: Vec<Order>,
	/// Pagination block.
	pub paging: Paging,
}

/// Filters for question searches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionQuery {
	/// Restricts the search to one listing; without it the seller's received questions are
	/// searched.
	pub item: Option<ItemId>,
	/// Restricts results to one status (for example `UNANSWERED`).
	pub status: Option<String>,
	/// Paging parameters.
	pub page: PageRequest,
}

/// Seller answer attached to a question.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerInfo {
	/// Free text.
	pub text: String,
	/// Provider status label.
	pub status: Option<String>,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339::option")]
	pub date_created: Option<OffsetDateTime>,
}

/// Buyer question on a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
	/// Marketplace identifier.
	pub id: u64,
	/// Listing asked about.
	#[serde(default)]
	pub item_id: Option<String>,
	/// Seller receiving the question.
	#[serde(default)]
	pub seller_id: Option<u64>,
	/// Free text.
	#[serde(default)]
	pub text: String,
	/// Provider status label.
	#[serde(default)]
	pub status: Option<String>,
	/// Creation instant.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub date_created: Option<OffsetDateTime>,
	/// Seller answer, once given.
	#[serde(default)]
	pub answer: Option<AnswerInfo>,
}

/// Question search page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionPage {
	/// Total number of matches.
	pub total: u64,
	/// Page entries.
	pub questions: Vec<Question>,
}

/// Body of `POST /answers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct AnswerRequest<'a> {
	pub(crate) question_id: u64,
	pub(crate) text: &'a str,
}

/// Rating shares over the evaluated period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ratings {
	/// Share of positive ratings.
	pub positive: f64,
	/// Share of negative ratings.
	pub negative: f64,
	/// Share of neutral ratings.
	pub neutral: f64,
}

/// Transaction counters behind a reputation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transactions {
	/// Total number of matches.
	pub total: u64,
	/// Completed transactions.
	pub completed: u64,
	/// Canceled transactions.
	pub canceled: u64,
	/// Rating shares.
	pub ratings: Ratings,
}

/// Seller reputation summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reputation {
	/// Color level, for example `5_green`.
	pub level_id: Option<String>,
	/// Power seller tier (`gold`, `platinum`, ...).
	pub power_seller_status: Option<String>,
	/// Transaction counters.
	pub transactions: Transactions,
}

/// Seller reference in a search result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellerRef {
	/// Marketplace identifier.
	pub id: u64,
}

/// One public listing returned by a site search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
	/// Marketplace identifier.
	pub id: String,
	/// Listing title.
	pub title: String,
	/// Unit price.
	pub price: f64,
	/// ISO currency code.
	pub currency_id: Option<String>,
	/// Public URL.
	pub permalink: Option<String>,
	/// Thumbnail image URL.
	pub thumbnail: Option<String>,
	/// Seller of the listing.
	pub seller: Option<SellerRef>,
}

/// Site search page (`GET /sites/{site}/search`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPage {
	/// Site searched.
	pub site_id: Option<String>,
	/// Query as echoed by the provider.
	pub query: Option<String>,
	/// Pagination block.
	pub paging: Paging,
	/// Page entries.
	pub results: Vec<SearchResult>,
}

/// Top-level category of a site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
	/// Marketplace identifier.
	pub id: CategoryId,
	/// Display name.
	#[serde(default)]
	pub name: String,
}

/// Trending search keyword.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trend {
	/// Trending keyword.
	pub keyword: String,
	/// Search URL for the keyword.
	pub url: String,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn item_update_omits_unset_fields() {
		let body = serde_json::to_string(&ItemUpdate::status(ItemStatus::Paused))
			.expect("Update should serialize.");

		assert_eq!(body, "{\"status\":\"paused\"}");
	}

	#[test]
	fn unknown_item_status_is_tolerated() {
		let item: Item = serde_json::from_str(
			"{\"id\":\"MLA1\",\"title\":\"Mate\",\"price\":1500.5,\"status\":\"payment_required\",\"extra\":1}",
		)
		.expect("Lenient item should deserialize.");

		assert_eq!(item.status, Some(ItemStatus::Unknown));
		assert_eq!(item.available_quantity, 0);
	}

	#[test]
	fn order_dates_parse_as_rfc3339_with_offsets() {
		let order: Order = serde_json::from_str(
			"{\"id\":2000001,\"status\":\"paid\",\"date_created\":\"2024-05-01T10:30:00.000-04:00\",\"total_amount\":3000}",
		)
		.expect("Order should deserialize.");
		let created = order.date_created.expect("Creation date should be present.");

		assert_eq!(created.offset().whole_hours(), -4);
		assert!(order.order_items.is_empty());
	}
}
