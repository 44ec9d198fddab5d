//! axum routes exposing a [`Dispatcher`] at `/webhooks`.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::State,
	http::HeaderMap,
	response::IntoResponse,
	routing::get,
};
use tokio::{net::TcpListener, signal};
// self
use crate::{_prelude::*, error::TransportError, webhook::Dispatcher};

/// Path the marketplace posts notifications to.
pub const WEBHOOK_PATH: &str = "/webhooks";

/// Builds the router serving `POST /webhooks` (notifications) and `GET /webhooks` (health).
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
	Router::new().route(WEBHOOK_PATH, get(health).post(receive)).with_state(dispatcher)
}

/// Serves `router` on `listener` until Ctrl+C or SIGTERM, then drains in-flight requests.
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
	serve_until(listener, router, shutdown_signal()).await
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve_until<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(%addr, path = WEBHOOK_PATH, "Webhook receiver listening.");
	}

	axum::serve(listener, router)
		.with_graceful_shutdown(shutdown)
		.await
		.map_err(TransportError::from)?;

	tracing::info!("Webhook receiver stopped.");

	Ok(())
}

async fn receive(
	State(dispatcher): State<Arc<Dispatcher>>,
	headers: HeaderMap,
	body: Bytes,
) -> impl IntoResponse {
	dispatcher.handle_inbound(&headers, &body).await
}

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
	Json(dispatcher.health())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = signal::ctrl_c().await {
			tracing::error!(error = %err, "Ctrl+C handler could not be installed.");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			},
			Err(err) => {
				tracing::error!(error = %err, "SIGTERM handler could not be installed.");
				std::future::pending::<()>().await;
			},
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	tracing::info!("Shutdown signal received.");
}
