use axum::{extract::State, http::StatusCode, routing::get, Router};

use super::{deleted, ApiResult, AppState, Json, Path, Query};
use crate::authors::{self, AuthorDetails, BookAuthor, BookAuthorBooks};
use crate::error::Result;
use crate::types::{Aid, Author, AuthorForm, AuthorWithCount, SearchQuery};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(create))
		.route("/from-books", get(from_books))
		.route("/books/:first/:last", get(books_by_name))
		.route("/:id", get(show).put(update).delete(remove))
}

async fn list(State(state): State<AppState>, Query(search): Query<SearchQuery>) -> ApiResult<Vec<AuthorWithCount>> {
	Ok(Json(authors::list_authors(&state.db, &search).await?))
}

async fn from_books(State(state): State<AppState>, Query(search): Query<SearchQuery>) -> ApiResult<Vec<BookAuthor>> {
	Ok(Json(authors::authors_from_books(&state.db, &search).await?))
}

async fn books_by_name(
	State(state): State<AppState>,
	Path((first, last)): Path<(String, String)>,
) -> ApiResult<BookAuthorBooks> {
	Ok(Json(authors::books_by_author_name(&state.db, &first, &last).await?))
}

async fn show(State(state): State<AppState>, Path(id): Path<Aid>) -> ApiResult<AuthorDetails> {
	Ok(Json(authors::author_details(&state.db, id).await?))
}

async fn create(State(state): State<AppState>, Json(form): Json<AuthorForm>) -> Result<(StatusCode, Json<Author>)> {
	let author = authors::create_author(&state.db, form.validated(true)?).await?;
	Ok((StatusCode::CREATED, Json(author)))
}

async fn update(
	State(state): State<AppState>,
	Path(id): Path<Aid>,
	Json(form): Json<AuthorForm>,
) -> ApiResult<Author> {
	Ok(Json(authors::update_author(&state.db, id, form.validated(false)?).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Aid>) -> ApiResult<serde_json::Value> {
	authors::delete_author(&state.db, id).await?;
	Ok(deleted("Author"))
}
