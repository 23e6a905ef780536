//! Books and the reading-history log.

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use crate::error::{LibraryError, Result};
use crate::sql::{set_if, Db};
use crate::stats::{listings, HISTORY_LISTING};
use crate::tracker::append_history;
use crate::types::{
	page_params, Bid, Book, BookChanges, BookChoice, BookDetails, BookFilter, BookListing, BorrowStatus,
	BorrowedBookEntry, BorrowedListing, BorrowedRow, CurrentlyReadingListing, HistoryListing, HistoryListingRow,
	HistoryQuery, HistoryRow, NewBook, Page, Pagination, ReadingHistoryEntry,
};

const LISTING: &str = r#"
SELECT b.*,
	NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), '') AS author_name,
	c.name AS category_name,
	c.color AS category_color
FROM books b
LEFT JOIN categories c ON c.id = b.category_id
"#;

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BookFilter) {
	qb.push(" WHERE 1 = 1");
	if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
		let pattern = format!("%{search}%");
		qb.push(" AND (b.title LIKE ").push_bind(pattern.clone());
		qb.push(" OR b.author_first_name LIKE ").push_bind(pattern.clone());
		qb.push(" OR b.author_last_name LIKE ").push_bind(pattern.clone());
		qb.push(" OR b.translator LIKE ").push_bind(pattern.clone());
		qb.push(" OR b.description LIKE ").push_bind(pattern);
		qb.push(")");
	}
	if let Some(category) = filter.category {
		qb.push(" AND b.category_id = ").push_bind(category);
	}
	if let Some(author) = filter.author.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
		let pattern = format!("%{author}%");
		qb.push(" AND (b.author_first_name LIKE ").push_bind(pattern.clone());
		qb.push(" OR b.author_last_name LIKE ").push_bind(pattern.clone());
		qb.push(" OR (COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')) LIKE ").push_bind(pattern);
		qb.push(")");
	}
	if let Some(is_read) = filter.is_read {
		qb.push(" AND b.is_read = ").push_bind(is_read);
	}
	if let Some(is_wishlist) = filter.is_wishlist {
		qb.push(" AND b.is_wishlist = ").push_bind(is_wishlist);
	}
	if let Some(is_borrowed) = filter.is_borrowed {
		qb.push(" AND b.is_borrowed = ").push_bind(is_borrowed);
	}
}

pub async fn list_books(db: &Db, filter: &BookFilter) -> Result<Page<BookListing>> {
	let (page, limit) = page_params(filter.page, filter.limit, 50)?;

	let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM books b");
	push_filters(&mut count, filter);
	let total: i64 = count.build_query_scalar().fetch_one(db.pool()).await?;
	let pagination = Pagination::new(page, limit, total);

	let sort = filter.sort.unwrap_or_default();
	let order = filter.order.unwrap_or_default();
	let mut query = QueryBuilder::<Sqlite>::new(LISTING);
	push_filters(&mut query, filter);
	query.push(" ORDER BY b.").push(sort.column()).push(" ").push(order.sql()).push(", b.id ").push(order.sql());
	query.push(" LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(pagination.offset());

	let data = query.build_query_as::<BookListing>().fetch_all(db.pool()).await?;
	Ok(Page { data, pagination })
}

pub async fn find_book(db: &Db, id: Bid) -> Result<Book> {
	sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
		.bind(id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Book not found"))
}

pub async fn book_listing(db: &Db, id: Bid) -> Result<BookListing> {
	sqlx::query_as::<_, BookListing>(&format!("{LISTING} WHERE b.id = ?"))
		.bind(id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Book not found"))
}

pub async fn book_details(db: &Db, id: Bid) -> Result<BookDetails> {
	let listing = book_listing(db, id).await?;

	let rows = sqlx::query_as::<_, HistoryRow>("SELECT * FROM reading_history WHERE book_id = ?")
		.bind(id)
		.fetch_all(db.pool())
		.await?;
	let mut reading_history = rows.into_iter()
		.map(ReadingHistoryEntry::try_from)
		.collect::<std::result::Result<Vec<_>, _>>()?;
	reading_history.sort_by(|a, b| b.finish_date.cmp(&a.finish_date));

	let borrowed_history = sqlx::query_as::<_, BorrowedBookEntry>(
		"SELECT * FROM borrowed_books WHERE book_id = ? ORDER BY borrowed_date DESC, id DESC",
	)
	.bind(id)
	.fetch_all(db.pool())
	.await?;

	Ok(BookDetails { listing, reading_history, borrowed_history })
}

/// Adds a book. One entered as already read gets its history entry in the
/// same transaction.
pub async fn create_book(db: &Db, book: NewBook) -> Result<Book> {
	let is_read = book.is_read.unwrap_or(false);
	let mut tx = db.begin().await?;

	let id = sqlx::query(
		r#"
		INSERT INTO books (
			title, author_id, author_first_name, author_last_name, category_id, sub_category, translator,
			description, pages, publication_year, publisher, language, price, rating, is_read, is_wishlist,
			notes, cover_image_url
		) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(?, 'Turkish'), ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(&book.title)
	.bind(book.author_id)
	.bind(&book.author_first_name)
	.bind(&book.author_last_name)
	.bind(book.category_id)
	.bind(&book.sub_category)
	.bind(&book.translator)
	.bind(&book.description)
	.bind(book.pages)
	.bind(book.publication_year)
	.bind(&book.publisher)
	.bind(&book.language)
	.bind(book.price)
	.bind(book.rating)
	.bind(is_read)
	.bind(book.is_wishlist.unwrap_or(false))
	.bind(&book.notes)
	.bind(&book.cover_image_url)
	.execute(&mut *tx)
	.await?
	.last_insert_rowid();

	if is_read {
		append_history(&mut tx, id, Utc::now(), book.rating, None).await?;
	}

	let created = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
		.bind(id)
		.fetch_one(&mut *tx)
		.await?;
	tx.commit().await?;

	info!("added book {id} '{}'", created.title);
	Ok(created)
}

/// Applies a partial update. Flipping a book to read logs a finish so the
/// read flag always has history behind it.
pub async fn update_book(db: &Db, id: Bid, changes: BookChanges) -> Result<Book> {
	let now = Utc::now();
	let mut tx = db.begin().await?;

	let was_read: bool = sqlx::query_scalar("SELECT is_read FROM books WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or(LibraryError::NotFound("Book not found"))?;
	let newly_read = changes.is_read == Some(true) && !was_read;
	let rating = changes.rating;

	let mut update = QueryBuilder::<Sqlite>::new("UPDATE books SET ");
	{
		let mut set = update.separated(", ");
		set_if(&mut set, "title", changes.title);
		set_if(&mut set, "author_id", changes.author_id);
		set_if(&mut set, "author_first_name", changes.author_first_name);
		set_if(&mut set, "author_last_name", changes.author_last_name);
		set_if(&mut set, "category_id", changes.category_id);
		set_if(&mut set, "sub_category", changes.sub_category);
		set_if(&mut set, "translator", changes.translator);
		set_if(&mut set, "description", changes.description);
		set_if(&mut set, "pages", changes.pages);
		set_if(&mut set, "publication_year", changes.publication_year);
		set_if(&mut set, "publisher", changes.publisher);
		set_if(&mut set, "language", changes.language);
		set_if(&mut set, "price", changes.price);
		set_if(&mut set, "rating", changes.rating);
		set_if(&mut set, "is_read", changes.is_read);
		set_if(&mut set, "is_wishlist", changes.is_wishlist);
		set_if(&mut set, "notes", changes.notes);
		set_if(&mut set, "cover_image_url", changes.cover_image_url);
		set_if(&mut set, "updated_at", Some(now));
	}
	update.push(" WHERE id = ").push_bind(id);
	update.build().execute(&mut *tx).await?;

	if newly_read {
		append_history(&mut tx, id, now, rating, None).await?;
	}

	let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
		.bind(id)
		.fetch_one(&mut *tx)
		.await?;
	tx.commit().await?;

	info!("updated book {id}");
	Ok(book)
}

pub async fn delete_book(db: &Db, id: Bid) -> Result<()> {
	let deleted = sqlx::query("DELETE FROM books WHERE id = ?")
		.bind(id)
		.execute(db.pool())
		.await?;
	if deleted.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Book not found"));
	}
	info!("deleted book {id}");
	Ok(())
}

/// Reading log with book titles, newest finish first, optionally limited to one year.
pub async fn reading_history(db: &Db, query: &HistoryQuery) -> Result<Page<HistoryListing>> {
	let (page, limit) = page_params(query.page, query.limit, 20)?;
	let rows = sqlx::query_as::<_, HistoryListingRow>(HISTORY_LISTING)
		.fetch_all(db.pool())
		.await?;

	let mut entries = listings(rows);
	if let Some(year) = query.year {
		entries.retain(|e| e.entry.finish_date.year() == year);
	}
	entries.sort_by(|a, b| b.entry.finish_date.cmp(&a.entry.finish_date).then(b.entry.id.cmp(&a.entry.id)));

	let pagination = Pagination::new(page, limit, entries.len() as i64);
	let data = entries.into_iter()
		.skip(pagination.offset() as usize)
		.take(limit as usize)
		.collect();
	Ok(Page { data, pagination })
}

const CHOICE: &str = r#"
SELECT b.id, b.title, b.pages, b.publisher, b.publication_year,
	COALESCE(NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), ''), 'Unknown Author') AS author_name
FROM books b
"#;

/// Loans with their book, newest first. `today` drives the overdue flag.
pub async fn borrowed_books(db: &Db, status: BorrowStatus, today: NaiveDate) -> Result<Vec<BorrowedListing>> {
	let mut query = QueryBuilder::<Sqlite>::new(
		r#"
		SELECT bb.*, b.title, b.publisher,
			COALESCE(NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), ''), 'Unknown Author') AS author_name
		FROM borrowed_books bb
		JOIN books b ON b.id = bb.book_id
		"#,
	);
	match status {
		BorrowStatus::All => {}
		BorrowStatus::Active => {
			query.push(" WHERE bb.is_returned = 0");
		}
		BorrowStatus::Returned => {
			query.push(" WHERE bb.is_returned = 1");
		}
	}
	query.push(" ORDER BY bb.borrowed_date DESC, bb.id DESC");

	let rows = query.build_query_as::<BorrowedRow>().fetch_all(db.pool()).await?;
	Ok(rows.into_iter().map(|row| BorrowedListing::new(row, today)).collect())
}

pub async fn books_available_to_lend(db: &Db) -> Result<Vec<BookChoice>> {
	Ok(sqlx::query_as::<_, BookChoice>(&format!("{CHOICE} WHERE b.is_borrowed = 0 ORDER BY b.title"))
		.fetch_all(db.pool())
		.await?)
}

/// Unread books that are not being read right now.
pub async fn books_available_to_read(db: &Db) -> Result<Vec<BookChoice>> {
	Ok(sqlx::query_as::<_, BookChoice>(&format!(
		"{CHOICE} WHERE b.is_read = 0 AND NOT EXISTS \
		 (SELECT 1 FROM currently_reading cr WHERE cr.book_id = b.id AND cr.is_active = 1) ORDER BY b.title"
	))
	.fetch_all(db.pool())
	.await?)
}

pub async fn currently_reading(db: &Db) -> Result<Vec<CurrentlyReadingListing>> {
	Ok(sqlx::query_as::<_, CurrentlyReadingListing>(
		r#"
		SELECT cr.*, b.title, b.publisher, b.publication_year, b.rating, b.is_read,
			NULLIF(TRIM(COALESCE(b.author_first_name, '') || ' ' || COALESCE(b.author_last_name, '')), '') AS author_name
		FROM currently_reading cr
		JOIN books b ON b.id = cr.book_id
		WHERE cr.is_active = 1
		ORDER BY cr.last_read_date DESC, cr.id DESC
		"#,
	)
	.fetch_all(db.pool())
	.await?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{BookSort, SortOrder};

	fn new_book(title: &str) -> NewBook {
		NewBook { title: Some(title.into()), ..Default::default() }
	}

	#[tokio::test]
	async fn created_read_book_has_history() {
		let db = Db::open_in_memory().await.unwrap();
		let book = create_book(&db, NewBook { is_read: Some(true), rating: Some(4), ..new_book("Beyaz Kale") })
			.await
			.unwrap();
		assert!(book.is_read);
		assert_eq!(book.language.as_deref(), Some("Turkish"));

		let details = book_details(&db, book.id).await.unwrap();
		assert_eq!(details.reading_history.len(), 1);
		assert_eq!(details.reading_history[0].rating, Some(4));
	}

	#[tokio::test]
	async fn filters_and_paginates() {
		let db = Db::open_in_memory().await.unwrap();
		for title in ["Alpha", "Beta", "Gamma"] {
			create_book(&db, new_book(title)).await.unwrap();
		}
		create_book(&db, NewBook { author_last_name: Some("Tanpinar".into()), ..new_book("Huzur") })
			.await
			.unwrap();

		let filter = BookFilter { limit: Some(2), sort: Some(BookSort::Title), order: Some(SortOrder::Asc), ..Default::default() };
		let page = list_books(&db, &filter).await.unwrap();
		assert_eq!(page.pagination.total, 4);
		assert_eq!(page.pagination.pages, 2);
		let titles: Vec<_> = page.data.iter().map(|b| b.book.title.as_str()).collect();
		assert_eq!(titles, ["Alpha", "Beta"]);

		let filter = BookFilter { search: Some("tanpi".into()), ..Default::default() };
		let page = list_books(&db, &filter).await.unwrap();
		assert_eq!(page.data.len(), 1);
		assert_eq!(page.data[0].author_name.as_deref(), Some("Tanpinar"));
	}

	#[tokio::test]
	async fn update_to_read_logs_history() {
		let db = Db::open_in_memory().await.unwrap();
		let book = create_book(&db, new_book("Masumiyet Muzesi")).await.unwrap();

		let changes = BookChanges { is_read: Some(true), rating: Some(3), ..Default::default() };
		let updated = update_book(&db, book.id, changes.clone()).await.unwrap();
		assert!(updated.is_read);
		assert_eq!(updated.rating, Some(3));
		assert!(updated.updated_at >= book.updated_at);

		// already read: no second entry
		update_book(&db, book.id, changes).await.unwrap();
		assert_eq!(book_details(&db, book.id).await.unwrap().reading_history.len(), 1);

		assert!(matches!(update_book(&db, 999, BookChanges::default()).await, Err(LibraryError::NotFound(_))));
	}

	#[tokio::test]
	async fn delete_cascades_and_reports_missing() {
		let db = Db::open_in_memory().await.unwrap();
		let book = create_book(&db, NewBook { is_read: Some(true), ..new_book("Kar") }).await.unwrap();
		delete_book(&db, book.id).await.unwrap();

		let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reading_history")
			.fetch_one(db.pool())
			.await
			.unwrap();
		assert_eq!(history, 0);
		assert!(matches!(delete_book(&db, book.id).await, Err(LibraryError::NotFound(_))));
	}

	#[tokio::test]
	async fn lending_views_follow_state() {
		use crate::tracker::{lend_book, return_book, start_reading, Lend, StartReading};

		let db = Db::open_in_memory().await.unwrap();
		let lent = create_book(&db, new_book("Sinekli Bakkal")).await.unwrap();
		let other = create_book(&db, new_book("Ates Gomlek")).await.unwrap();
		let loan = lend_book(&db, Lend {
			book_id: lent.id,
			borrower_name: "Zeynep".into(),
			borrower_contact: None,
			borrowed_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
			expected_return_date: None,
			notes: None,
		})
		.await
		.unwrap();

		let today = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
		let active = borrowed_books(&db, BorrowStatus::Active, today).await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].row.author_name, "Unknown Author");
		assert!(active[0].is_overdue);
		let available: Vec<_> = books_available_to_lend(&db).await.unwrap().into_iter().map(|b| b.id).collect();
		assert_eq!(available, vec![other.id]);

		return_book(&db, loan.id, None).await.unwrap();
		assert!(borrowed_books(&db, BorrowStatus::Active, today).await.unwrap().is_empty());
		assert_eq!(borrowed_books(&db, BorrowStatus::Returned, today).await.unwrap().len(), 1);

		start_reading(&db, StartReading { book_id: other.id, current_page: 3, total_pages: None, notes: None })
			.await
			.unwrap();
		let reading = currently_reading(&db).await.unwrap();
		assert_eq!(reading.len(), 1);
		assert_eq!(reading[0].title, "Ates Gomlek");
		let to_read: Vec<_> = books_available_to_read(&db).await.unwrap().into_iter().map(|b| b.id).collect();
		assert_eq!(to_read, vec![lent.id]);
	}

	#[tokio::test]
	async fn history_filters_by_year() {
		let db = Db::open_in_memory().await.unwrap();
		let book = create_book(&db, new_book("Benim Adim Kirmizi")).await.unwrap();
		for date in ["2023-05-01", "2024-02-01", "1706745600000"] {
			sqlx::query("INSERT INTO reading_history (book_id, finish_date) VALUES (?, ?)")
				.bind(book.id)
				.bind(date)
				.execute(db.pool())
				.await
				.unwrap();
		}

		let page = reading_history(&db, &HistoryQuery { year: Some(2024), ..Default::default() }).await.unwrap();
		assert_eq!(page.pagination.total, 2);
		assert!(page.data.iter().all(|h| h.title == "Benim Adim Kirmizi"));
	}
}
