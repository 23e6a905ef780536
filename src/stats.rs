//! Read-only aggregates over the library. The pure functions at the top take
//! already-loaded rows; the loaders below fetch a snapshot and feed them.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::warn;

use crate::error::{LibraryError, Result};
use crate::sql::Db;
use crate::time::normalize_finish_date;
use crate::types::{Cid, HistoryListing, HistoryListingRow, ReadingHistoryEntry};

/// Window for the rolling "current streak" count.
pub const STREAK_WINDOW_DAYS: i64 = 30;
pub const RECENT_ACTIVITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, FromRow)]
pub struct Counts {
	pub total_books: i64,
	pub read_books: i64,
	pub wishlist_books: i64,
	pub borrowed_books: i64,
	pub total_authors: i64,
	pub total_categories: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overview {
	#[serde(flatten)]
	pub counts: Counts,
	pub reading_percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
	pub overview: Overview,
	pub recent_activity: Vec<HistoryListing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubcategoryCount {
	pub sub_category: String,
	pub book_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CategoryCounts {
	pub id: Cid,
	pub name: String,
	pub color: String,
	pub description: Option<String>,
	pub book_count: i64,
	pub read_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
	#[serde(flatten)]
	pub category: CategoryCounts,
	pub subcategories: Vec<SubcategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
	pub month: u32,
	pub books_read: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyProgress {
	pub year: i32,
	pub monthly_data: Vec<MonthCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct AuthorCount {
	pub name: String,
	pub book_count: i64,
	pub books_read: i64,
}

/// Field names are kept for API compatibility; neither "streak" is a
/// consecutive-day streak. `current_streak` counts finishes in the last 30
/// days and `longest_streak` is the total number of finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievements {
	pub current_streak: i64,
	pub longest_streak: i64,
	pub total_reading_days: i64,
	pub average_rating: f64,
}

/// One normalized reading-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finish {
	pub at: DateTime<Utc>,
	pub rating: Option<i64>,
}

pub fn reading_percentage(read: i64, total: i64) -> i64 {
	if total <= 0 {
		return 0;
	}
	(read as f64 / total as f64 * 100.0).round() as i64
}

pub fn monthly_counts(finishes: &[Finish], year: i32) -> Vec<MonthCount> {
	let mut buckets = [0i64; 12];
	for finish in finishes.iter().filter(|f| f.at.year() == year) {
		buckets[finish.at.month0() as usize] += 1;
	}
	buckets.iter()
		.enumerate()
		.map(|(i, &books_read)| MonthCount { month: i as u32 + 1, books_read })
		.collect()
}

pub fn achievements(finishes: &[Finish], now: DateTime<Utc>) -> Achievements {
	let window_start = now - Duration::days(STREAK_WINDOW_DAYS);
	let current_streak = finishes.iter().filter(|f| f.at >= window_start).count() as i64;
	let total_reading_days = finishes.iter()
		.map(|f| f.at.date_naive())
		.collect::<HashSet<_>>()
		.len() as i64;

	Achievements {
		current_streak,
		longest_streak: finishes.len() as i64,
		total_reading_days,
		average_rating: average_rating(finishes.iter().filter_map(|f| f.rating)),
	}
}

/// Mean of the positive ratings to one decimal, 0 when there are none.
pub fn average_rating(ratings: impl IntoIterator<Item = i64>) -> f64 {
	let (sum, n) = ratings.into_iter()
		.filter(|r| *r > 0)
		.fold((0i64, 0i64), |(sum, n), r| (sum + r, n + 1));
	if n == 0 {
		return 0.0;
	}
	(sum as f64 / n as f64 * 10.0).round() / 10.0
}

/// Attaches subcategory counts to their categories, busiest categories first.
pub fn assemble_distribution(
	categories: Vec<CategoryCounts>,
	subcategories: Vec<(Cid, String, i64)>,
) -> Vec<CategoryShare> {
	let mut by_category: BTreeMap<Cid, Vec<SubcategoryCount>> = BTreeMap::new();
	for (category_id, sub_category, book_count) in subcategories {
		let label = sub_category.trim();
		if label.is_empty() {
			continue;
		}
		by_category.entry(category_id)
			.or_default()
			.push(SubcategoryCount { sub_category: label.to_string(), book_count });
	}

	let mut shares: Vec<CategoryShare> = categories.into_iter()
		.map(|category| {
			let mut subcategories = by_category.remove(&category.id).unwrap_or_default();
			subcategories.sort_by(|a, b| b.book_count.cmp(&a.book_count).then_with(|| a.sub_category.cmp(&b.sub_category)));
			CategoryShare { category, subcategories }
		})
		.collect();
	shares.sort_by(|a, b| {
		b.category.book_count.cmp(&a.category.book_count)
			.then_with(|| a.category.name.cmp(&b.category.name))
	});
	shares
}

// ---- loaders ----

const COUNTS: &str = r#"
SELECT
	(SELECT COUNT(*) FROM books) AS total_books,
	(SELECT COUNT(*) FROM books WHERE is_read = 1) AS read_books,
	(SELECT COUNT(*) FROM wishlist WHERE is_purchased = 0) AS wishlist_books,
	(SELECT COUNT(*) FROM borrowed_books WHERE is_returned = 0) AS borrowed_books,
	(SELECT COUNT(*) FROM (
		SELECT 1 FROM books
		WHERE TRIM(COALESCE(author_first_name, '') || COALESCE(author_last_name, '')) <> ''
		GROUP BY TRIM(COALESCE(author_first_name, '')), TRIM(COALESCE(author_last_name, ''))
	)) AS total_authors,
	(SELECT COUNT(*) FROM categories) AS total_categories
"#;

pub async fn counts(db: &Db) -> Result<Counts> {
	Ok(sqlx::query_as::<_, Counts>(COUNTS).fetch_one(db.pool()).await?)
}

/// Every readable finish in the log. Rows whose date cannot be made sense of
/// are logged and left out of the aggregates.
pub async fn load_finishes(db: &Db) -> Result<Vec<Finish>> {
	let rows: Vec<(i64, String, Option<i64>)> =
		sqlx::query_as("SELECT id, CAST(finish_date AS TEXT), rating FROM reading_history")
			.fetch_all(db.pool())
			.await?;

	Ok(rows.into_iter()
		.filter_map(|(id, raw, rating)| match normalize_finish_date(&raw) {
			Ok(at) => Some(Finish { at, rating }),
			Err(e) => {
				warn!("skipping reading history {id}: {e}");
				None
			}
		})
		.collect())
}

pub(crate) fn listings(rows: Vec<HistoryListingRow>) -> Vec<HistoryListing> {
	rows.into_iter()
		.filter_map(|row| {
			let id = row.history.id;
			match ReadingHistoryEntry::try_from(row.history) {
				Ok(entry) => Some(HistoryListing { entry, title: row.title, pages: row.pages, author_name: row.author_name }),
				Err(e) => {
					warn!("skipping reading history {id}: {e}");
					None
				}
			}
		})
		.collect()
}

pub const HISTORY_LISTING: &str = r#"
SELECT rh.*, b.title, b.pages,
	NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), '') AS author_name
FROM reading_history rh
JOIN books b ON b.id = rh.book_id
"#;

/// Latest finishes first. Sorting happens after normalization because stored
/// dates mix ISO text and epoch millis.
pub async fn recent_activity(db: &Db, limit: usize) -> Result<Vec<HistoryListing>> {
	let rows = sqlx::query_as::<_, HistoryListingRow>(HISTORY_LISTING)
		.fetch_all(db.pool())
		.await?;
	let mut recent = listings(rows);
	recent.sort_by(|a, b| b.entry.finish_date.cmp(&a.entry.finish_date).then(b.entry.id.cmp(&a.entry.id)));
	recent.truncate(limit);
	Ok(recent)
}

pub async fn overview(db: &Db) -> Result<Overview> {
	let counts = counts(db).await?;
	Ok(Overview { reading_percentage: reading_percentage(counts.read_books, counts.total_books), counts })
}

pub async fn dashboard(db: &Db) -> Result<Dashboard> {
	Ok(Dashboard {
		overview: overview(db).await?,
		recent_activity: recent_activity(db, RECENT_ACTIVITY).await?,
	})
}

pub async fn category_distribution(db: &Db) -> Result<Vec<CategoryShare>> {
	let categories = sqlx::query_as::<_, CategoryCounts>(
		r#"
		SELECT c.id, c.name, c.color, c.description,
			COUNT(b.id) AS book_count,
			COALESCE(SUM(CASE WHEN b.is_read = 1 THEN 1 ELSE 0 END), 0) AS read_count
		FROM categories c
		LEFT JOIN books b ON b.category_id = c.id
		GROUP BY c.id
		"#,
	)
	.fetch_all(db.pool())
	.await?;

	let subcategories: Vec<(Cid, String, i64)> = sqlx::query_as(
		r#"
		SELECT category_id, TRIM(sub_category), COUNT(*)
		FROM books
		WHERE category_id IS NOT NULL AND TRIM(COALESCE(sub_category, '')) <> ''
		GROUP BY category_id, TRIM(sub_category)
		"#,
	)
	.fetch_all(db.pool())
	.await?;

	Ok(assemble_distribution(categories, subcategories))
}

pub async fn monthly_reading_progress(db: &Db, year: i32) -> Result<MonthlyProgress> {
	let finishes = load_finishes(db).await?;
	Ok(MonthlyProgress { year, monthly_data: monthly_counts(&finishes, year) })
}

pub async fn top_authors(db: &Db, limit: i64) -> Result<Vec<AuthorCount>> {
	if limit < 1 {
		return Err(LibraryError::invalid("limit", "Limit must be at least 1"));
	}
	Ok(sqlx::query_as::<_, AuthorCount>(
		r#"
		SELECT TRIM(TRIM(COALESCE(author_first_name, '')) || ' ' || TRIM(COALESCE(author_last_name, ''))) AS name,
			COUNT(*) AS book_count,
			COALESCE(SUM(CASE WHEN is_read = 1 THEN 1 ELSE 0 END), 0) AS books_read
		FROM books
		WHERE TRIM(COALESCE(author_first_name, '') || COALESCE(author_last_name, '')) <> ''
		GROUP BY TRIM(COALESCE(author_first_name, '')), TRIM(COALESCE(author_last_name, ''))
		ORDER BY book_count DESC, name ASC
		LIMIT ?
		"#,
	)
	.bind(limit)
	.fetch_all(db.pool())
	.await?)
}

pub async fn library_achievements(db: &Db) -> Result<Achievements> {
	let finishes = load_finishes(db).await?;
	Ok(achievements(&finishes, Utc::now()))
}
