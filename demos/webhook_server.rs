//! Runs the notification receiver on `MELIDASH_WEBHOOK_ADDR` (default `127.0.0.1:8080`) with a
//! custom handler for order notifications and logging handlers for every other topic.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use tokio::net::TcpListener;
// self
use melidash::{
	obs,
	webhook::{self, Dispatcher, HandlerFuture, NotificationEnvelope, Topic, TopicHandler},
};

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

struct OrderAlerts;
impl TopicHandler for OrderAlerts {
	fn handle<'a>(&'a self, notification: &'a NotificationEnvelope) -> HandlerFuture<'a> {
		Box::pin(async move {
			tracing::info!(
				resource = %notification.resource,
				seller = notification.user_id,
				"New order activity; fetch the resource to sync the dashboard."
			);

			Ok(())
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	obs::init_tracing("info,melidash=debug", false);

	let addr = std::env::var("MELIDASH_WEBHOOK_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
	let dispatcher =
		Dispatcher::new("MercadoLibre").with_handler(Topic::Orders, Arc::new(OrderAlerts));
	let listener = TcpListener::bind(&addr).await?;

	webhook::serve(listener, webhook::router(Arc::new(dispatcher))).await?;

	Ok(())
}
