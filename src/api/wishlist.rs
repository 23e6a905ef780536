use axum::{
	extract::State,
	http::StatusCode,
	routing::{get, patch, put},
	Router,
};

use super::{deleted, ApiResult, AppState, Json, Path, Query};
use crate::error::Result;
use crate::types::{NewWish, SearchQuery, WishChanges, WishlistItem};
use crate::wishlist::{self, WishlistStats};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(add))
		.route("/stats", get(stats))
		.route("/:id", put(update).delete(remove))
		.route("/:id/purchase", patch(purchase))
}

async fn list(State(state): State<AppState>, Query(search): Query<SearchQuery>) -> ApiResult<Vec<WishlistItem>> {
	Ok(Json(wishlist::list_wishes(&state.db, &search).await?))
}

async fn add(State(state): State<AppState>, Json(form): Json<NewWish>) -> Result<(StatusCode, Json<WishlistItem>)> {
	let wish = wishlist::add_wish(&state.db, form.validated()?).await?;
	Ok((StatusCode::CREATED, Json(wish)))
}

async fn update(
	State(state): State<AppState>,
	Path(id): Path<i64>,
	Json(form): Json<WishChanges>,
) -> ApiResult<WishlistItem> {
	Ok(Json(wishlist::update_wish(&state.db, id, form.validated()?).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<serde_json::Value> {
	wishlist::delete_wish(&state.db, id).await?;
	Ok(deleted("Wish"))
}

async fn purchase(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<WishlistItem> {
	Ok(Json(wishlist::mark_purchased(&state.db, id).await?))
}

async fn stats(State(state): State<AppState>) -> ApiResult<WishlistStats> {
	Ok(Json(wishlist::wishlist_stats(&state.db).await?))
}
