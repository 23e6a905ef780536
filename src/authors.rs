//! The authors table, plus the looser view of authors derived from the
//! first/last name pair stored on each book.

use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::info;

use crate::error::{LibraryError, Result};
use crate::sql::{set_if, Db};
use crate::stats::average_rating;
use crate::types::{Aid, Author, AuthorFields, AuthorWithCount, Book, BookListing, SearchQuery};

#[derive(Debug, Clone, Serialize)]
pub struct AuthorDetails {
	#[serde(flatten)]
	pub author: Author,
	pub books: Vec<Book>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BookAuthor {
	pub first_name: String,
	pub last_name: String,
	pub full_name: String,
	pub book_count: i64,
	pub read_count: i64,
	pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookAuthorStats {
	pub first_name: String,
	pub last_name: String,
	pub full_name: String,
	pub total_books: i64,
	pub read_books: i64,
	pub avg_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookAuthorBooks {
	pub author: BookAuthorStats,
	pub books: Vec<BookListing>,
}

pub async fn list_authors(db: &Db, search: &SearchQuery) -> Result<Vec<AuthorWithCount>> {
	let mut query = QueryBuilder::<Sqlite>::new(
		"SELECT a.*, COUNT(b.id) AS book_count FROM authors a LEFT JOIN books b ON b.author_id = a.id",
	);
	if let Some(pattern) = search.pattern() {
		query.push(" WHERE a.name LIKE ").push_bind(pattern);
	}
	query.push(" GROUP BY a.id ORDER BY a.name");
	Ok(query.build_query_as::<AuthorWithCount>().fetch_all(db.pool()).await?)
}

pub async fn find_author(db: &Db, id: Aid) -> Result<Author> {
	sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = ?")
		.bind(id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Author not found"))
}

pub async fn author_details(db: &Db, id: Aid) -> Result<AuthorDetails> {
	let author = find_author(db, id).await?;
	let books = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE author_id = ? ORDER BY title")
		.bind(id)
		.fetch_all(db.pool())
		.await?;
	Ok(AuthorDetails { author, books })
}

pub async fn create_author(db: &Db, fields: AuthorFields) -> Result<Author> {
	let name = fields.name.ok_or_else(|| LibraryError::invalid("name", "Author name is required"))?;
	let id = sqlx::query(
		"INSERT INTO authors (name, biography, nationality, birth_date, death_date) VALUES (?, ?, ?, ?, ?)",
	)
	.bind(&name)
	.bind(&fields.biography)
	.bind(&fields.nationality)
	.bind(fields.birth_date)
	.bind(fields.death_date)
	.execute(db.pool())
	.await?
	.last_insert_rowid();

	info!("created author {id} '{name}'");
	find_author(db, id).await
}

pub async fn update_author(db: &Db, id: Aid, fields: AuthorFields) -> Result<Author> {
	let mut update = QueryBuilder::<Sqlite>::new("UPDATE authors SET ");
	{
		let mut set = update.separated(", ");
		set_if(&mut set, "name", fields.name);
		set_if(&mut set, "biography", fields.biography);
		set_if(&mut set, "nationality", fields.nationality);
		set_if(&mut set, "birth_date", fields.birth_date);
		set_if(&mut set, "death_date", fields.death_date);
		set_if(&mut set, "updated_at", Some(chrono::Utc::now()));
	}
	update.push(" WHERE id = ").push_bind(id);

	if update.build().execute(db.pool()).await?.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Author not found"));
	}
	find_author(db, id).await
}

pub async fn delete_author(db: &Db, id: Aid) -> Result<()> {
	let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE author_id = ?")
		.bind(id)
		.fetch_one(db.pool())
		.await?;
	if in_use > 0 {
		return Err(LibraryError::conflict("Cannot delete author that has books assigned to them"));
	}

	let deleted = sqlx::query("DELETE FROM authors WHERE id = ?")
		.bind(id)
		.execute(db.pool())
		.await?;
	if deleted.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Author not found"));
	}
	info!("deleted author {id}");
	Ok(())
}

/// Authors as they appear on books, grouped by name pair.
pub async fn authors_from_books(db: &Db, search: &SearchQuery) -> Result<Vec<BookAuthor>> {
	let mut query = QueryBuilder::<Sqlite>::new(
		r#"
		SELECT TRIM(author_first_name) AS first_name,
			TRIM(author_last_name) AS last_name,
			TRIM(author_first_name) || ' ' || TRIM(author_last_name) AS full_name,
			COUNT(*) AS book_count,
			COALESCE(SUM(CASE WHEN is_read = 1 THEN 1 ELSE 0 END), 0) AS read_count,
			ROUND(AVG(CASE WHEN rating > 0 THEN rating END), 1) AS avg_rating
		FROM books
		WHERE TRIM(COALESCE(author_first_name, '')) <> '' AND TRIM(COALESCE(author_last_name, '')) <> ''
		"#,
	);
	if let Some(pattern) = search.pattern() {
		query.push(" AND (author_first_name LIKE ").push_bind(pattern.clone());
		query.push(" OR author_last_name LIKE ").push_bind(pattern);
		query.push(")");
	}
	query.push(" GROUP BY TRIM(author_first_name), TRIM(author_last_name) ORDER BY last_name, first_name");
	Ok(query.build_query_as::<BookAuthor>().fetch_all(db.pool()).await?)
}

pub async fn books_by_author_name(db: &Db, first_name: &str, last_name: &str) -> Result<BookAuthorBooks> {
	let books = sqlx::query_as::<_, BookListing>(
		r#"
		SELECT b.*,
			NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), '') AS author_name,
			c.name AS category_name,
			c.color AS category_color
		FROM books b
		LEFT JOIN categories c ON c.id = b.category_id
		WHERE TRIM(COALESCE(b.author_first_name, '')) = ? AND TRIM(COALESCE(b.author_last_name, '')) = ?
		ORDER BY b.title
		"#,
	)
	.bind(first_name.trim())
	.bind(last_name.trim())
	.fetch_all(db.pool())
	.await?;

	let author = BookAuthorStats {
		first_name: first_name.to_string(),
		last_name: last_name.to_string(),
		full_name: format!("{first_name} {last_name}"),
		total_books: books.len() as i64,
		read_books: books.iter().filter(|b| b.book.is_read).count() as i64,
		avg_rating: average_rating(books.iter().filter_map(|b| b.book.rating)),
	};
	Ok(BookAuthorBooks { author, books })
}
