use axum::{
	extract::State,
	http::StatusCode,
	routing::{get, patch},
	Router,
};

use super::{deleted, ApiResult, AppState, Json, Path, Query};
use crate::catalog;
use crate::error::Result;
use crate::tracker;
use crate::types::{
	BookChoice, CurrentlyReadingEntry, CurrentlyReadingListing, HistoryListing, HistoryQuery, Page, ProgressForm,
	StartReadingForm,
};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(start))
		.route("/available-books", get(available))
		.route("/:id", patch(progress).delete(remove))
		.route("/:id/finish", patch(finish))
}

pub fn history_routes() -> Router<AppState> {
	Router::new().route("/", get(history))
}

async fn list(State(state): State<AppState>) -> ApiResult<Vec<CurrentlyReadingListing>> {
	Ok(Json(catalog::currently_reading(&state.db).await?))
}

async fn available(State(state): State<AppState>) -> ApiResult<Vec<BookChoice>> {
	Ok(Json(catalog::books_available_to_read(&state.db).await?))
}

async fn start(
	State(state): State<AppState>,
	Json(form): Json<StartReadingForm>,
) -> Result<(StatusCode, Json<CurrentlyReadingEntry>)> {
	let entry = tracker::start_reading(&state.db, form.validated()?).await?;
	Ok((StatusCode::CREATED, Json(entry)))
}

async fn progress(
	State(state): State<AppState>,
	Path(id): Path<i64>,
	Json(form): Json<ProgressForm>,
) -> ApiResult<CurrentlyReadingEntry> {
	Ok(Json(tracker::update_progress(&state.db, id, form.validated()?).await?))
}

async fn finish(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<CurrentlyReadingEntry> {
	Ok(Json(tracker::finish_reading(&state.db, id).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<serde_json::Value> {
	tracker::remove_from_currently_reading(&state.db, id).await?;
	Ok(deleted("Currently reading record"))
}

async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> ApiResult<Page<HistoryListing>> {
	Ok(Json(catalog::reading_history(&state.db, &query).await?))
}
