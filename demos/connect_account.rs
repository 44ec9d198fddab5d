//! Connects a seller account end to end: prints the authorize URL, waits for the `code` the
//! marketplace appends to the redirect, exchanges it, and loads the seller profile.
//!
//! Reads `MELIDASH_CLIENT_ID`, `MELIDASH_CLIENT_SECRET`, and `MELIDASH_REDIRECT_URI` (plus any
//! other `MELIDASH_*` override) from the environment.

// std
use std::{io::BufRead, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use melidash::{
	api::{OrderQuery, PageRequest},
	auth::SessionId,
	client::ApiClient,
	config::MarketplaceConfig,
	flows::ReqwestTokenManager,
	obs,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	obs::init_tracing("info,melidash=debug", false);

	let config = MarketplaceConfig::from_env()?;
	let manager = Arc::new(ReqwestTokenManager::new(config)?);
	let session = SessionId::new("demo-session")?;
	let request = manager.start_authorization(session.clone()).await?;

	println!("Open {} and approve the application.", request.authorize_url);
	println!("Paste the `code` query parameter from the redirect:");

	let mut code = String::new();

	std::io::stdin().lock().read_line(&mut code)?;

	manager.complete_authorization(&session, &request.state, code.trim()).await?;

	let client = ApiClient::new(manager.clone());
	let user = client.get_user_info().await?;

	println!("Connected as {} ({}).", user.nickname, user.id);

	let query =
		OrderQuery { page: PageRequest { limit: Some(5), ..Default::default() }, ..Default::default() };
	let orders = client.get_orders(user.id, &query).await?;

	for order in &orders.results {
		println!("Order {} [{}] {:.2}", order.id, order.status, order.total_amount);
	}

	let categories = client.list_default_categories().await?;

	println!(
		"{} top-level categories on {}.",
		categories.len(),
		manager.config().default_site()
	);

	Ok(())
}
