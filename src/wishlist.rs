//! Books wanted but not owned. Kept apart from the catalog: buying one does
//! not create a book.

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::info;

use crate::error::{LibraryError, Result};
use crate::sql::{set_if, Db};
use crate::types::{NewWish, SearchQuery, WishChanges, WishlistItem};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct WishlistStats {
	pub total_wishes: i64,
	pub purchased_wishes: i64,
	pub pending_wishes: i64,
	pub estimated_total_value: f64,
}

pub async fn list_wishes(db: &Db, search: &SearchQuery) -> Result<Vec<WishlistItem>> {
	let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM wishlist");
	if let Some(pattern) = search.pattern() {
		query.push(" WHERE book_name LIKE ").push_bind(pattern.clone());
		query.push(" OR author_name LIKE ").push_bind(pattern);
	}
	query.push(" ORDER BY added_date DESC, id DESC");
	Ok(query.build_query_as::<WishlistItem>().fetch_all(db.pool()).await?)
}

pub async fn find_wish(db: &Db, id: i64) -> Result<WishlistItem> {
	sqlx::query_as::<_, WishlistItem>("SELECT * FROM wishlist WHERE id = ?")
		.bind(id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Wish not found"))
}

/// Case-insensitive key for duplicate detection. Dotted and dotless i fold
/// together, so Turkish titles match in either case.
fn fold_case(text: &str) -> String {
	text.trim()
		.chars()
		.flat_map(char::to_lowercase)
		.filter(|c| *c != '\u{307}')
		.map(|c| if c == 'ı' { 'i' } else { c })
		.collect()
}

pub async fn add_wish(db: &Db, wish: NewWish) -> Result<WishlistItem> {
	let book_key = fold_case(wish.book_name.as_deref().unwrap_or_default());
	let author_key = fold_case(wish.author_name.as_deref().unwrap_or_default());
	let existing: Vec<(String, String)> = sqlx::query_as("SELECT book_name, author_name FROM wishlist")
		.fetch_all(db.pool())
		.await?;
	if existing.iter().any(|(book, author)| fold_case(book) == book_key && fold_case(author) == author_key) {
		return Err(LibraryError::conflict("This book is already in your wishlist"));
	}

	let id = sqlx::query("INSERT INTO wishlist (book_name, author_name, notes, price, publisher) VALUES (?, ?, ?, ?, ?)")
		.bind(&wish.book_name)
		.bind(&wish.author_name)
		.bind(&wish.notes)
		.bind(wish.price)
		.bind(&wish.publisher)
		.execute(db.pool())
		.await?
		.last_insert_rowid();

	info!("added wish {id}");
	find_wish(db, id).await
}

pub async fn update_wish(db: &Db, id: i64, changes: WishChanges) -> Result<WishlistItem> {
	let mut update = QueryBuilder::<Sqlite>::new("UPDATE wishlist SET ");
	{
		let mut set = update.separated(", ");
		set_if(&mut set, "book_name", changes.book_name);
		set_if(&mut set, "author_name", changes.author_name);
		set_if(&mut set, "notes", changes.notes);
		set_if(&mut set, "price", changes.price);
		set_if(&mut set, "publisher", changes.publisher);
		set_if(&mut set, "is_purchased", changes.is_purchased);
		set_if(&mut set, "updated_at", Some(Utc::now()));
	}
	update.push(" WHERE id = ").push_bind(id);

	if update.build().execute(db.pool()).await?.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Wish not found"));
	}
	find_wish(db, id).await
}

pub async fn mark_purchased(db: &Db, id: i64) -> Result<WishlistItem> {
	update_wish(db, id, WishChanges { is_purchased: Some(true), ..Default::default() }).await
}

pub async fn delete_wish(db: &Db, id: i64) -> Result<()> {
	let deleted = sqlx::query("DELETE FROM wishlist WHERE id = ?")
		.bind(id)
		.execute(db.pool())
		.await?;
	if deleted.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Wish not found"));
	}
	info!("deleted wish {id}");
	Ok(())
}

pub async fn wishlist_stats(db: &Db) -> Result<WishlistStats> {
	Ok(sqlx::query_as::<_, WishlistStats>(
		r#"
		SELECT COUNT(*) AS total_wishes,
			COALESCE(SUM(CASE WHEN is_purchased = 1 THEN 1 ELSE 0 END), 0) AS purchased_wishes,
			COALESCE(SUM(CASE WHEN is_purchased = 0 THEN 1 ELSE 0 END), 0) AS pending_wishes,
			CAST(COALESCE(SUM(price), 0) AS REAL) AS estimated_total_value
		FROM wishlist
		"#,
	)
	.fetch_one(db.pool())
	.await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wish(book: &str, author: &str, price: Option<f64>) -> NewWish {
		NewWish {
			book_name: Some(book.into()),
			author_name: Some(author.into()),
			price,
			..Default::default()
		}
		.validated()
		.unwrap()
	}

	#[tokio::test]
	async fn duplicates_ignore_case() {
		let db = Db::open_in_memory().await.unwrap();
		let first = add_wish(&db, wish("  Kiralik Konak ", "Yakup Kadri", Some(80.0))).await.unwrap();
		assert_eq!(first.book_name, "Kiralik Konak");
		let err = add_wish(&db, wish("kiralik konak", "YAKUP KADRI", None)).await.unwrap_err();
		assert!(matches!(err, LibraryError::Conflict(_)));
	}

	#[test]
	fn folding_handles_turkish_letters() {
		assert_eq!(fold_case(" Çalıkuşu "), fold_case("ÇALIKUŞU"));
		assert_eq!(fold_case("İnce Memed"), fold_case("ince memed"));
		assert_ne!(fold_case("Yaban"), fold_case("Yabancı"));
	}

	#[tokio::test]
	async fn turkish_duplicates_ignore_case() {
		let db = Db::open_in_memory().await.unwrap();
		add_wish(&db, wish("Çalıkuşu", "Reşat Nuri Güntekin", None)).await.unwrap();
		let err = add_wish(&db, wish("ÇALIKUŞU", "REŞAT NURİ GÜNTEKİN", None)).await.unwrap_err();
		assert!(matches!(err, LibraryError::Conflict(_)));
		add_wish(&db, wish("Yaprak Dökümü", "Reşat Nuri Güntekin", None)).await.unwrap();
	}

	#[tokio::test]
	async fn purchase_and_stats() {
		let db = Db::open_in_memory().await.unwrap();
		let stats = wishlist_stats(&db).await.unwrap();
		assert_eq!(stats, WishlistStats { total_wishes: 0, purchased_wishes: 0, pending_wishes: 0, estimated_total_value: 0.0 });

		let a = add_wish(&db, wish("Yaban", "Yakup Kadri", Some(40.5))).await.unwrap();
		add_wish(&db, wish("Sodom ve Gomore", "Yakup Kadri", None)).await.unwrap();
		add_wish(&db, wish("Dokuzuncu Hariciye Kogusu", "Peyami Safa", Some(30.0))).await.unwrap();

		assert!(mark_purchased(&db, a.id).await.unwrap().is_purchased);
		let stats = wishlist_stats(&db).await.unwrap();
		assert_eq!((stats.total_wishes, stats.purchased_wishes, stats.pending_wishes), (3, 1, 2));
		assert_eq!(stats.estimated_total_value, 70.5);

		let found = list_wishes(&db, &SearchQuery { search: Some("peyami".into()) }).await.unwrap();
		assert_eq!(found.len(), 1);

		delete_wish(&db, a.id).await.unwrap();
		assert!(matches!(mark_purchased(&db, a.id).await, Err(LibraryError::NotFound(_))));
	}
}
