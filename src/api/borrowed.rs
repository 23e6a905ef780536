use axum::{
	extract::State,
	http::StatusCode,
	routing::{get, patch},
	Router,
};
use chrono::Utc;

use super::{ApiResult, AppState, Json, OptionalJson, Path, Query};
use crate::catalog;
use crate::error::Result;
use crate::tracker;
use crate::types::{BookChoice, BorrowedBookEntry, BorrowedListing, BorrowedQuery, LendForm, ReturnForm};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(lend))
		.route("/available-books", get(available))
		.route("/:id/return", patch(give_back))
}

async fn list(State(state): State<AppState>, Query(query): Query<BorrowedQuery>) -> ApiResult<Vec<BorrowedListing>> {
	let status = query.status.unwrap_or_default();
	let today = Utc::now().date_naive();
	Ok(Json(catalog::borrowed_books(&state.db, status, today).await?))
}

async fn available(State(state): State<AppState>) -> ApiResult<Vec<BookChoice>> {
	Ok(Json(catalog::books_available_to_lend(&state.db).await?))
}

async fn lend(State(state): State<AppState>, Json(form): Json<LendForm>) -> Result<(StatusCode, Json<BorrowedBookEntry>)> {
	let entry = tracker::lend_book(&state.db, form.validated()?).await?;
	Ok((StatusCode::CREATED, Json(entry)))
}

async fn give_back(
	State(state): State<AppState>,
	Path(id): Path<i64>,
	OptionalJson(form): OptionalJson<ReturnForm>,
) -> ApiResult<BorrowedBookEntry> {
	let returned_on = form.validated()?;
	Ok(Json(tracker::return_book(&state.db, id, returned_on).await?))
}
