use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use crate::error::{LibraryError, Result};
use crate::sql::{set_if, Db};
use crate::stats::average_rating;
use crate::types::{BookListing, Category, CategoryChanges, CategoryWithCount, Cid, NewCategory, DEFAULT_CATEGORY_COLOR};

/// Sub-category labels offered for each default category.
pub const SUB_CATEGORIES: [(&str, &[&str]); 6] = [
	("EDEBIYAT", &[
		"ROMAN", "SIIR", "OYKU", "DENEME", "INCELEME", "BIYOGRAFI", "DUNYA KLASIKLERI", "TURK KLASIKLERI",
	]),
	("TARIH", &[
		"TURK POLITIKASI", "DUNYA POLITIKASI", "TARIH", "SOSYOLOJI", "ARASTIRMA", "TARIHI KISILER", "GAZETECILIK",
	]),
	("DIN-MITOLOJI", &["TASAVVUF", "ISLAMIYET", "MEZHEPLER", "MITOLOJI", "DIN ADAMLARI", "DIGER DINLER"]),
	("FELSEFE", &["FELSEFE BILIMI", "FILOZOFLAR"]),
	("HOBI", &["YEMEK", "SPOR", "PSIKOLOJI", "HAYVANLAR", "BITKILER", "MODA", "ASTROLOJI", "RESIM"]),
	("BILIM ve SANAT", &[
		"POPULER BILIM", "BILIM TARIHI", "BILIM INSANLARI", "SINEMA", "MUZIK", "TIYATRO", "SANAT TARIHI",
		"MIMARI", "FOTOGRAF", "SANATCILAR",
	]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCategoryOption {
	pub name: &'static str,
	pub value: &'static str,
}

pub fn sub_category_map() -> BTreeMap<&'static str, &'static [&'static str]> {
	SUB_CATEGORIES.into_iter().collect()
}

pub fn sub_categories_of(category: &str) -> Option<Vec<SubCategoryOption>> {
	SUB_CATEGORIES.iter()
		.find(|(name, _)| *name == category)
		.map(|(_, labels)| labels.iter().map(|&label| SubCategoryOption { name: label, value: label }).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDetails {
	#[serde(flatten)]
	pub category: Category,
	pub books: Vec<BookListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
	#[serde(flatten)]
	pub category: Category,
	pub total_books: i64,
	pub read_books: i64,
	pub avg_rating: f64,
	pub subcategories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBooks {
	pub category: CategorySummary,
	pub books: Vec<BookListing>,
}

const CATEGORY_BOOKS: &str = r#"
SELECT b.*,
	NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), '') AS author_name,
	c.name AS category_name,
	c.color AS category_color
FROM books b
LEFT JOIN categories c ON c.id = b.category_id
WHERE b.category_id = "#;

pub async fn list_categories(db: &Db) -> Result<Vec<CategoryWithCount>> {
	Ok(sqlx::query_as::<_, CategoryWithCount>(
		r#"
		SELECT c.*, COUNT(b.id) AS book_count
		FROM categories c
		LEFT JOIN books b ON b.category_id = c.id
		GROUP BY c.id
		ORDER BY c.name
		"#,
	)
	.fetch_all(db.pool())
	.await?)
}

pub async fn find_category(db: &Db, id: Cid) -> Result<Category> {
	sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
		.bind(id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Category not found"))
}

async fn books_of(db: &Db, id: Cid, subcategory: Option<&str>) -> Result<Vec<BookListing>> {
	let mut query = QueryBuilder::<Sqlite>::new(CATEGORY_BOOKS);
	query.push_bind(id);
	if let Some(sub) = subcategory {
		query.push(" AND b.sub_category = ").push_bind(sub.to_string());
	}
	query.push(" ORDER BY b.title");
	Ok(query.build_query_as::<BookListing>().fetch_all(db.pool()).await?)
}

pub async fn category_details(db: &Db, id: Cid) -> Result<CategoryDetails> {
	let category = find_category(db, id).await?;
	let books = books_of(db, id, None).await?;
	Ok(CategoryDetails { category, books })
}

/// Books of one category, optionally narrowed to a sub-category, with a summary.
pub async fn category_books(db: &Db, id: Cid, subcategory: Option<&str>) -> Result<CategoryBooks> {
	let category = find_category(db, id).await?;
	let subcategory = subcategory.map(str::trim).filter(|s| !s.is_empty());
	let books = books_of(db, id, subcategory).await?;

	let mut subcategories: Vec<String> = Vec::new();
	for sub in books.iter().filter_map(|b| b.book.sub_category.as_deref()) {
		if !sub.is_empty() && !subcategories.iter().any(|s| s == sub) {
			subcategories.push(sub.to_string());
		}
	}

	let summary = CategorySummary {
		total_books: books.len() as i64,
		read_books: books.iter().filter(|b| b.book.is_read).count() as i64,
		avg_rating: average_rating(books.iter().filter_map(|b| b.book.rating)),
		subcategories,
		category,
	};
	Ok(CategoryBooks { category: summary, books })
}

pub async fn create_category(db: &Db, category: NewCategory) -> Result<Category> {
	let id = sqlx::query("INSERT INTO categories (name, description, color) VALUES (?, ?, ?)")
		.bind(&category.name)
		.bind(&category.description)
		.bind(category.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR))
		.execute(db.pool())
		.await
		.map_err(|e| LibraryError::unique_or(e, "Category name already exists"))?
		.last_insert_rowid();

	info!("created category {id}");
	find_category(db, id).await
}

pub async fn update_category(db: &Db, id: Cid, changes: CategoryChanges) -> Result<Category> {
	let mut update = QueryBuilder::<Sqlite>::new("UPDATE categories SET ");
	{
		let mut set = update.separated(", ");
		set_if(&mut set, "name", changes.name);
		set_if(&mut set, "description", changes.description);
		set_if(&mut set, "color", changes.color);
		set_if(&mut set, "updated_at", Some(chrono::Utc::now()));
	}
	update.push(" WHERE id = ").push_bind(id);

	let updated = update.build()
		.execute(db.pool())
		.await
		.map_err(|e| LibraryError::unique_or(e, "Category name already exists"))?;
	if updated.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Category not found"));
	}
	find_category(db, id).await
}

pub async fn delete_category(db: &Db, id: Cid) -> Result<()> {
	let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE category_id = ?")
		.bind(id)
		.fetch_one(db.pool())
		.await?;
	if in_use > 0 {
		return Err(LibraryError::conflict("Cannot delete category that has books assigned to it"));
	}

	let deleted = sqlx::query("DELETE FROM categories WHERE id = ?")
		.bind(id)
		.execute(db.pool())
		.await?;
	if deleted.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Category not found"));
	}
	info!("deleted category {id}");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn named(name: &str) -> NewCategory {
		NewCategory { name: Some(name.into()), ..Default::default() }
	}

	#[test]
	fn sub_category_lookup() {
		let felsefe = sub_categories_of("FELSEFE").unwrap();
		assert_eq!(felsefe, vec![
			SubCategoryOption { name: "FELSEFE BILIMI", value: "FELSEFE BILIMI" },
			SubCategoryOption { name: "FILOZOFLAR", value: "FILOZOFLAR" },
		]);
		assert!(sub_categories_of("felsefe").is_none());
		assert_eq!(sub_category_map().len(), 6);
	}

	#[tokio::test]
	async fn duplicate_name_is_a_conflict() {
		let db = Db::open_in_memory().await.unwrap();
		let poetry = create_category(&db, named("Poetry")).await.unwrap();
		assert_eq!(poetry.color, DEFAULT_CATEGORY_COLOR);
		assert!(matches!(create_category(&db, named("Poetry")).await, Err(LibraryError::Conflict(_))));

		let drama = create_category(&db, named("Drama")).await.unwrap();
		let rename = CategoryChanges { name: Some("Poetry".into()), ..Default::default() };
		assert!(matches!(update_category(&db, drama.id, rename).await, Err(LibraryError::Conflict(_))));
	}

	#[tokio::test]
	async fn delete_blocked_while_referenced() {
		let db = Db::open_in_memory().await.unwrap();
		let category = create_category(&db, named("Essays")).await.unwrap();
		sqlx::query("INSERT INTO books (title, category_id, sub_category, rating) VALUES ('a', ?, 'DENEME', 4), ('b', ?, NULL, 5)")
			.bind(category.id)
			.bind(category.id)
			.execute(db.pool())
			.await
			.unwrap();

		assert!(matches!(delete_category(&db, category.id).await, Err(LibraryError::Conflict(_))));

		let listed = list_categories(&db).await.unwrap();
		assert_eq!(listed[0].book_count, 2);

		let books = category_books(&db, category.id, None).await.unwrap();
		assert_eq!(books.category.total_books, 2);
		assert_eq!(books.category.avg_rating, 4.5);
		assert_eq!(books.category.subcategories, vec!["DENEME".to_string()]);
		let narrowed = category_books(&db, category.id, Some("DENEME")).await.unwrap();
		assert_eq!(narrowed.books.len(), 1);

		sqlx::query("DELETE FROM books").execute(db.pool()).await.unwrap();
		delete_category(&db, category.id).await.unwrap();
		assert!(matches!(delete_category(&db, category.id).await, Err(LibraryError::NotFound(_))));
	}
}
