use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, routing::get, Router};

use super::{deleted, ApiResult, AppState, Json, Path, Query};
use crate::categories::{self, CategoryBooks, CategoryDetails, SubCategoryOption};
use crate::error::{LibraryError, Result};
use crate::stats::{self, CategoryShare};
use crate::types::{Category, CategoryChanges, CategoryWithCount, Cid, NewCategory, SubcategoryQuery};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(create))
		.route("/distribution", get(distribution))
		.route("/:id", get(show).put(update).delete(remove))
		.route("/:id/books", get(books))
}

pub fn sub_category_routes() -> Router<AppState> {
	Router::new()
		.route("/", get(all_sub_categories))
		.route("/:category", get(sub_categories))
}

async fn list(State(state): State<AppState>) -> ApiResult<Vec<CategoryWithCount>> {
	Ok(Json(categories::list_categories(&state.db).await?))
}

async fn distribution(State(state): State<AppState>) -> ApiResult<Vec<CategoryShare>> {
	Ok(Json(stats::category_distribution(&state.db).await?))
}

async fn show(State(state): State<AppState>, Path(id): Path<Cid>) -> ApiResult<CategoryDetails> {
	Ok(Json(categories::category_details(&state.db, id).await?))
}

async fn books(
	State(state): State<AppState>,
	Path(id): Path<Cid>,
	Query(query): Query<SubcategoryQuery>,
) -> ApiResult<CategoryBooks> {
	Ok(Json(categories::category_books(&state.db, id, query.subcategory.as_deref()).await?))
}

async fn create(State(state): State<AppState>, Json(form): Json<NewCategory>) -> Result<(StatusCode, Json<Category>)> {
	let category = categories::create_category(&state.db, form.validated()?).await?;
	Ok((StatusCode::CREATED, Json(category)))
}

async fn update(
	State(state): State<AppState>,
	Path(id): Path<Cid>,
	Json(form): Json<CategoryChanges>,
) -> ApiResult<Category> {
	Ok(Json(categories::update_category(&state.db, id, form.validated()?).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Cid>) -> ApiResult<serde_json::Value> {
	categories::delete_category(&state.db, id).await?;
	Ok(deleted("Category"))
}

async fn all_sub_categories() -> Json<BTreeMap<&'static str, &'static [&'static str]>> {
	Json(categories::sub_category_map())
}

async fn sub_categories(Path(category): Path<String>) -> ApiResult<Vec<SubCategoryOption>> {
	categories::sub_categories_of(&category)
		.map(Json)
		.ok_or(LibraryError::NotFound("Category not found"))
}
