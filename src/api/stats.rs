use axum::{extract::State, routing::get, Router};
use chrono::{Datelike, Utc};

use super::{ApiResult, AppState, Json, Query};
use crate::stats::{self, Achievements, AuthorCount, CategoryShare, Dashboard, MonthlyProgress};
use crate::types::{LimitQuery, YearQuery};

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(dashboard))
		.route("/reading-progress", get(reading_progress))
		.route("/top-authors", get(top_authors))
		.route("/achievements", get(achievements))
		.route("/category-distribution", get(category_distribution))
}

async fn dashboard(State(state): State<AppState>) -> ApiResult<Dashboard> {
	Ok(Json(stats::dashboard(&state.db).await?))
}

async fn reading_progress(State(state): State<AppState>, Query(query): Query<YearQuery>) -> ApiResult<MonthlyProgress> {
	let year = query.year.unwrap_or_else(|| Utc::now().year());
	Ok(Json(stats::monthly_reading_progress(&state.db, year).await?))
}

async fn top_authors(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> ApiResult<Vec<AuthorCount>> {
	Ok(Json(stats::top_authors(&state.db, query.limit.unwrap_or(10)).await?))
}

async fn achievements(State(state): State<AppState>) -> ApiResult<Achievements> {
	Ok(Json(stats::library_achievements(&state.db).await?))
}

async fn category_distribution(State(state): State<AppState>) -> ApiResult<Vec<CategoryShare>> {
	Ok(Json(stats::category_distribution(&state.db).await?))
}
