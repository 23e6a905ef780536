//! JSON REST surface under `/api`, plus the HTML dashboard and optional static client.

use std::sync::Arc;
use std::time::Instant;

use axum::{
	async_trait,
	body::Bytes,
	extract::{FromRequest, FromRequestParts, Request, State},
	http::HeaderName,
	middleware,
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
	cors::CorsLayer,
	request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
	services::ServeDir,
	timeout::TimeoutLayer,
	trace::TraceLayer,
};
use tracing::info_span;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ErrorDetail, LibraryError};
use crate::pages;
use crate::sql::Db;

mod authors;
mod books;
mod borrowed;
mod categories;
mod reading;
mod stats;
mod wishlist;

#[derive(Clone)]
pub struct AppState {
	pub db: Db,
	pub config: Arc<Config>,
	pub started: Instant,
}

impl AppState {
	pub fn new(db: Db, config: Config) -> Self {
		AppState { db, config: Arc::new(config), started: Instant::now() }
	}
}

/// `axum::Json` with rejections reported in the library's error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(LibraryError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
	fn into_response(self) -> Response {
		axum::Json(self.0).into_response()
	}
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(LibraryError))]
pub struct Query<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(LibraryError))]
pub struct Path<T>(pub T);

/// JSON body that may be left out entirely. Only an empty body falls back to
/// `T::default()`; anything else must deserialize.
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
	T: DeserializeOwned + Default,
	S: Send + Sync,
{
	type Rejection = LibraryError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let bytes = Bytes::from_request(req, state)
			.await
			.map_err(|e| LibraryError::invalid("body", e.body_text()))?;
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(OptionalJson(T::default()));
		}
		let axum::Json(value) = axum::Json::<T>::from_bytes(&bytes)?;
		Ok(OptionalJson(value))
	}
}

pub type ApiResult<T> = Result<Json<T>, LibraryError>;

fn deleted(what: &str) -> Json<serde_json::Value> {
	Json(json!({ "message": format!("{what} deleted successfully") }))
}

#[derive(Clone, Copy, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
	fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
		let id = Uuid::new_v4().to_string().parse().ok()?;
		Some(RequestId::new(id))
	}
}

pub fn router(state: AppState) -> Router {
	let request_id = HeaderName::from_static("x-request-id");
	let api = Router::new()
		.route("/health", get(health))
		.nest("/books", books::routes())
		.nest("/borrowed", borrowed::routes())
		.nest("/currently-reading", reading::routes())
		.nest("/reading-history", reading::history_routes())
		.nest("/wishlist", wishlist::routes())
		.nest("/categories", categories::routes())
		.nest("/sub-categories", categories::sub_category_routes())
		.nest("/authors", authors::routes())
		.nest("/stats", stats::routes());

	let mut app = Router::new()
		.route("/", get(pages::dashboard))
		.nest("/api", api);
	if let Some(dir) = &state.config.static_dir {
		app = app.nest_service("/app", ServeDir::new(dir));
	}

	app.fallback(not_found)
		.layer(middleware::map_response_with_state(state.clone(), expose_error_detail))
		.layer(
			ServiceBuilder::new()
				.layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
				.layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
					let request_id = request.headers()
						.get("x-request-id")
						.and_then(|v| v.to_str().ok())
						.unwrap_or("-");
					info_span!("request", method = %request.method(), uri = %request.uri(), request_id)
				}))
				.layer(TimeoutLayer::new(state.config.request_timeout))
				.layer(PropagateRequestIdLayer::new(request_id))
				.layer(CorsLayer::permissive()),
		)
		.with_state(state)
}

async fn not_found() -> LibraryError {
	LibraryError::NotFound("Route not found")
}

/// In development, unexpected failures show their cause next to the generic message.
async fn expose_error_detail(State(state): State<AppState>, response: Response) -> Response {
	if !state.config.environment.is_development() {
		return response;
	}
	let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
		return response;
	};
	let status = response.status();
	(status, axum::Json(json!({ "error": "Something went wrong!", "message": detail }))).into_response()
}

#[derive(Debug, Serialize)]
struct Health {
	status: &'static str,
	timestamp: chrono::DateTime<Utc>,
	uptime: f64,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
	Json(Health {
		status: "OK",
		timestamp: Utc::now(),
		uptime: state.started.elapsed().as_secs_f64(),
	})
}
