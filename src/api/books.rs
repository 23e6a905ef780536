use axum::{
	extract::State,
	http::StatusCode,
	routing::{get, patch},
	Router,
};

use super::{deleted, ApiResult, AppState, Json, OptionalJson, Path, Query};
use crate::catalog;
use crate::error::Result;
use crate::tracker;
use crate::types::{
	Bid, Book, BookChanges, BookDetails, BookFilter, BookListing, MarkReadForm, NewBook, Page, ReadingHistoryEntry,
};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(create))
		.route("/:id", get(show).put(update).delete(remove))
		.route("/:id/read", patch(mark_read))
}

async fn list(State(state): State<AppState>, Query(filter): Query<BookFilter>) -> ApiResult<Page<BookListing>> {
	Ok(Json(catalog::list_books(&state.db, &filter).await?))
}

async fn show(State(state): State<AppState>, Path(id): Path<Bid>) -> ApiResult<BookDetails> {
	Ok(Json(catalog::book_details(&state.db, id).await?))
}

async fn create(State(state): State<AppState>, Json(form): Json<NewBook>) -> Result<(StatusCode, Json<Book>)> {
	let book = catalog::create_book(&state.db, form.validated()?).await?;
	Ok((StatusCode::CREATED, Json(book)))
}

async fn update(
	State(state): State<AppState>,
	Path(id): Path<Bid>,
	Json(form): Json<BookChanges>,
) -> ApiResult<Book> {
	Ok(Json(catalog::update_book(&state.db, id, form.validated()?).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Bid>) -> ApiResult<serde_json::Value> {
	catalog::delete_book(&state.db, id).await?;
	Ok(deleted("Book"))
}

// an empty body marks the book read now, without a rating
async fn mark_read(
	State(state): State<AppState>,
	Path(id): Path<Bid>,
	OptionalJson(form): OptionalJson<MarkReadForm>,
) -> ApiResult<ReadingHistoryEntry> {
	Ok(Json(tracker::mark_as_read(&state.db, id, form.validated()?).await?))
}
