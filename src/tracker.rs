//! Multi-record state transitions: reading, lending and progress tracking.
//!
//! Every transition that touches more than one table runs inside a single
//! transaction, so a book's flags never disagree with the log tables.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};

use crate::error::{LibraryError, Result};
use crate::sql::Db;
use crate::types::{Bid, BorrowedBookEntry, CurrentlyReadingEntry, HistoryRow, ReadingHistoryEntry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkRead {
	pub rating: Option<i64>,
	pub notes: Option<String>,
	/// Defaults to now.
	pub finish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lend {
	pub book_id: Bid,
	pub borrower_name: String,
	pub borrower_contact: Option<String>,
	pub borrowed_date: NaiveDate,
	pub expected_return_date: Option<NaiveDate>,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartReading {
	pub book_id: Bid,
	pub current_page: i64,
	pub total_pages: Option<i64>,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
	pub current_page: i64,
	pub total_pages: Option<i64>,
	pub notes: Option<String>,
}

/// Percentage read, two decimals. Unknown or zero totals give 0.
pub fn reading_progress(current_page: i64, total_pages: Option<i64>) -> f64 {
	match total_pages {
		Some(total) if total > 0 => {
			let percent = current_page as f64 / total as f64 * 100.0;
			(percent * 100.0).round() / 100.0
		}
		_ => 0.0,
	}
}

/// Finish dates are written the way browsers serialize them.
pub fn finish_date_text(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Appends a reading-history row inside an open transaction.
pub(crate) async fn append_history(
	tx: &mut Transaction<'static, Sqlite>,
	book_id: Bid,
	finished: DateTime<Utc>,
	rating: Option<i64>,
	notes: Option<&str>,
) -> Result<ReadingHistoryEntry> {
	let id = sqlx::query("INSERT INTO reading_history (book_id, finish_date, rating, notes) VALUES (?, ?, ?, ?)")
		.bind(book_id)
		.bind(finish_date_text(finished))
		.bind(rating)
		.bind(notes)
		.execute(&mut **tx)
		.await?
		.last_insert_rowid();

	let row = sqlx::query_as::<_, HistoryRow>("SELECT * FROM reading_history WHERE id = ?")
		.bind(id)
		.fetch_one(&mut **tx)
		.await?;
	Ok(ReadingHistoryEntry::try_from(row)?)
}

/// Flags the book read, keeps a rating if given, closes any active
/// currently-reading entry and logs the finish. All or nothing.
pub async fn mark_as_read(db: &Db, book_id: Bid, read: MarkRead) -> Result<ReadingHistoryEntry> {
	let now = Utc::now();
	let finished = read.finish_date.unwrap_or(now);

	let mut tx = db.begin().await?;
	let updated = sqlx::query("UPDATE books SET is_read = 1, rating = COALESCE(?, rating), updated_at = ? WHERE id = ?")
		.bind(read.rating)
		.bind(now)
		.bind(book_id)
		.execute(&mut *tx)
		.await?;
	if updated.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Book not found"));
	}

	let closed = sqlx::query(
		"UPDATE currently_reading SET is_active = 0, last_read_date = ?, updated_at = ? WHERE book_id = ? AND is_active = 1",
	)
	.bind(now)
	.bind(now)
	.bind(book_id)
	.execute(&mut *tx)
	.await?;
	if closed.rows_affected() > 0 {
		debug!("closed active reading entry for book {book_id}");
	}

	let entry = append_history(&mut tx, book_id, finished, read.rating, read.notes.as_deref()).await?;
	tx.commit().await?;

	info!("book {book_id} marked as read");
	Ok(entry)
}

/// Lends a book out. The borrowed flag is flipped with a guarded UPDATE first,
/// so of two concurrent lends only one can win.
pub async fn lend_book(db: &Db, lend: Lend) -> Result<BorrowedBookEntry> {
	let now = Utc::now();
	let mut tx = db.begin().await?;

	let flagged = sqlx::query("UPDATE books SET is_borrowed = 1, updated_at = ? WHERE id = ? AND is_borrowed = 0")
		.bind(now)
		.bind(lend.book_id)
		.execute(&mut *tx)
		.await?;
	if flagged.rows_affected() == 0 {
		let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM books WHERE id = ?")
			.bind(lend.book_id)
			.fetch_optional(&mut *tx)
			.await?;
		return Err(match exists {
			None => LibraryError::NotFound("Book not found"),
			Some(_) => LibraryError::conflict("Book is already borrowed"),
		});
	}

	let id = sqlx::query(
		"INSERT INTO borrowed_books (book_id, borrower_name, borrower_contact, borrowed_date, expected_return_date, notes) \
		 VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(lend.book_id)
	.bind(&lend.borrower_name)
	.bind(&lend.borrower_contact)
	.bind(lend.borrowed_date)
	.bind(lend.expected_return_date)
	.bind(&lend.notes)
	.execute(&mut *tx)
	.await
	.map_err(|e| LibraryError::unique_or(e, "Book is already borrowed"))?
	.last_insert_rowid();

	let entry = sqlx::query_as::<_, BorrowedBookEntry>("SELECT * FROM borrowed_books WHERE id = ?")
		.bind(id)
		.fetch_one(&mut *tx)
		.await?;
	tx.commit().await?;

	info!("book {} lent to {}", lend.book_id, lend.borrower_name);
	Ok(entry)
}

/// Closes an open loan and clears the book's borrowed flag.
pub async fn return_book(db: &Db, borrowed_id: i64, returned_on: Option<NaiveDate>) -> Result<BorrowedBookEntry> {
	let now = Utc::now();
	let returned_on = returned_on.unwrap_or_else(|| now.date_naive());
	let mut tx = db.begin().await?;

	let closed = sqlx::query(
		"UPDATE borrowed_books SET is_returned = 1, actual_return_date = ?, updated_at = ? WHERE id = ? AND is_returned = 0",
	)
	.bind(returned_on)
	.bind(now)
	.bind(borrowed_id)
	.execute(&mut *tx)
	.await?;

	let entry = sqlx::query_as::<_, BorrowedBookEntry>("SELECT * FROM borrowed_books WHERE id = ?")
		.bind(borrowed_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or(LibraryError::NotFound("Borrowed record not found"))?;
	if closed.rows_affected() == 0 {
		return Err(LibraryError::conflict("Book has already been returned"));
	}

	sqlx::query("UPDATE books SET is_borrowed = 0, updated_at = ? WHERE id = ?")
		.bind(now)
		.bind(entry.book_id)
		.execute(&mut *tx)
		.await?;
	tx.commit().await?;

	info!("book {} returned by {}", entry.book_id, entry.borrower_name);
	Ok(entry)
}

pub async fn reading_entry(db: &Db, entry_id: i64) -> Result<CurrentlyReadingEntry> {
	sqlx::query_as::<_, CurrentlyReadingEntry>("SELECT * FROM currently_reading WHERE id = ?")
		.bind(entry_id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Currently reading record not found"))
}

async fn active_entry(db: &Db, entry_id: i64) -> Result<CurrentlyReadingEntry> {
	sqlx::query_as::<_, CurrentlyReadingEntry>("SELECT * FROM currently_reading WHERE id = ? AND is_active = 1")
		.bind(entry_id)
		.fetch_optional(db.pool())
		.await?
		.ok_or(LibraryError::NotFound("Currently reading record not found"))
}

async fn book_pages(db: &Db, book_id: Bid) -> Result<Option<Option<i64>>> {
	Ok(sqlx::query_scalar::<_, Option<i64>>("SELECT pages FROM books WHERE id = ?")
		.bind(book_id)
		.fetch_optional(db.pool())
		.await?)
}

/// Opens progress tracking for a book. Re-reading a finished book is allowed.
pub async fn start_reading(db: &Db, start: StartReading) -> Result<CurrentlyReadingEntry> {
	let active: Option<i64> = sqlx::query_scalar("SELECT id FROM currently_reading WHERE book_id = ? AND is_active = 1")
		.bind(start.book_id)
		.fetch_optional(db.pool())
		.await?;
	if active.is_some() {
		return Err(LibraryError::conflict("Book is already in currently reading list"));
	}

	let pages = book_pages(db, start.book_id)
		.await?
		.ok_or(LibraryError::NotFound("Book not found"))?;
	let total_pages = start.total_pages.or(pages);
	let progress = reading_progress(start.current_page, total_pages);
	let now = Utc::now();

	let id = sqlx::query(
		"INSERT INTO currently_reading (book_id, current_page, total_pages, reading_progress, started_date, last_read_date, notes) \
		 VALUES (?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(start.book_id)
	.bind(start.current_page)
	.bind(total_pages)
	.bind(progress)
	.bind(now)
	.bind(now)
	.bind(&start.notes)
	.execute(db.pool())
	.await
	.map_err(|e| LibraryError::unique_or(e, "Book is already in currently reading list"))?
	.last_insert_rowid();

	info!("started reading book {} at page {}", start.book_id, start.current_page);
	reading_entry(db, id).await
}

pub async fn update_progress(db: &Db, entry_id: i64, progress: Progress) -> Result<CurrentlyReadingEntry> {
	let entry = active_entry(db, entry_id).await?;
	let total_pages = match progress.total_pages.or(entry.total_pages) {
		Some(total) => Some(total),
		None => book_pages(db, entry.book_id).await?.flatten(),
	};
	let percent = reading_progress(progress.current_page, total_pages);
	let now = Utc::now();

	sqlx::query(
		"UPDATE currently_reading SET current_page = ?, total_pages = ?, reading_progress = ?, \
		 notes = COALESCE(?, notes), last_read_date = ?, updated_at = ? WHERE id = ?",
	)
	.bind(progress.current_page)
	.bind(total_pages)
	.bind(percent)
	.bind(&progress.notes)
	.bind(now)
	.bind(now)
	.bind(entry_id)
	.execute(db.pool())
	.await?;

	debug!("reading entry {entry_id} at {percent}%");
	reading_entry(db, entry_id).await
}

/// Soft-closes an entry. The book is not marked read here; callers that
/// want a history entry follow up with [`mark_as_read`].
pub async fn finish_reading(db: &Db, entry_id: i64) -> Result<CurrentlyReadingEntry> {
	let now = Utc::now();
	let closed = sqlx::query(
		"UPDATE currently_reading SET is_active = 0, last_read_date = ?, updated_at = ? WHERE id = ? AND is_active = 1",
	)
	.bind(now)
	.bind(now)
	.bind(entry_id)
	.execute(db.pool())
	.await?;
	if closed.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Currently reading record not found"));
	}

	info!("finished reading entry {entry_id}");
	reading_entry(db, entry_id).await
}

pub async fn remove_from_currently_reading(db: &Db, entry_id: i64) -> Result<()> {
	let removed = sqlx::query("DELETE FROM currently_reading WHERE id = ?")
		.bind(entry_id)
		.execute(db.pool())
		.await?;
	if removed.rows_affected() == 0 {
		return Err(LibraryError::NotFound("Currently reading record not found"));
	}
	info!("removed reading entry {entry_id}");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	async fn book(db: &Db, title: &str, pages: Option<i64>) -> Bid {
		sqlx::query("INSERT INTO books (title, pages) VALUES (?, ?)")
			.bind(title)
			.bind(pages)
			.execute(db.pool())
			.await
			.unwrap()
			.last_insert_rowid()
	}

	async fn flags(db: &Db, id: Bid) -> (bool, bool, Option<i64>) {
		sqlx::query_as("SELECT is_read, is_borrowed, rating FROM books WHERE id = ?")
			.bind(id)
			.fetch_one(db.pool())
			.await
			.unwrap()
	}

	async fn count(db: &Db, sql: &str, id: Bid) -> i64 {
		sqlx::query_scalar(sql).bind(id).fetch_one(db.pool()).await.unwrap()
	}

	fn lend(book_id: Bid) -> Lend {
		Lend {
			book_id,
			borrower_name: "Ayse".into(),
			borrower_contact: None,
			borrowed_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
			expected_return_date: None,
			notes: None,
		}
	}

	#[test]
	fn progress_rounds_to_two_decimals() {
		assert_eq!(reading_progress(50, Some(200)), 25.0);
		assert_eq!(reading_progress(1, Some(3)), 33.33);
		assert_eq!(reading_progress(2, Some(3)), 66.67);
		assert_eq!(reading_progress(10, None), 0.0);
		assert_eq!(reading_progress(10, Some(0)), 0.0);
	}

	#[tokio::test]
	async fn mark_as_read_writes_flag_and_history() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Tutunamayanlar", Some(724)).await;
		let finished = Utc.with_ymd_and_hms(2024, 2, 10, 18, 0, 0).unwrap();

		let entry = mark_as_read(&db, id, MarkRead { rating: Some(5), finish_date: Some(finished), ..Default::default() })
			.await
			.unwrap();
		assert_eq!(entry.finish_date, finished);
		assert_eq!(entry.rating, Some(5));
		assert_eq!(flags(&db, id).await, (true, false, Some(5)));
		assert_eq!(count(&db, "SELECT COUNT(*) FROM reading_history WHERE book_id = ?", id).await, 1);

		// re-reading appends, and a missing rating keeps the old one
		mark_as_read(&db, id, MarkRead::default()).await.unwrap();
		assert_eq!(count(&db, "SELECT COUNT(*) FROM reading_history WHERE book_id = ?", id).await, 2);
		assert_eq!(flags(&db, id).await.2, Some(5));
	}

	#[tokio::test]
	async fn mark_as_read_unknown_book_leaves_no_trace() {
		let db = Db::open_in_memory().await.unwrap();
		let err = mark_as_read(&db, 99, MarkRead::default()).await.unwrap_err();
		assert!(matches!(err, LibraryError::NotFound(_)));
		let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reading_history")
			.fetch_one(db.pool())
			.await
			.unwrap();
		assert_eq!(rows, 0);
	}

	#[tokio::test]
	async fn mark_as_read_closes_active_reading() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Saatleri Ayarlama Enstitusu", Some(400)).await;
		let entry = start_reading(&db, StartReading { book_id: id, current_page: 390, total_pages: None, notes: None })
			.await
			.unwrap();

		mark_as_read(&db, id, MarkRead::default()).await.unwrap();
		assert!(!reading_entry(&db, entry.id).await.unwrap().is_active);
	}

	#[tokio::test]
	async fn lend_then_return_round_trip() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Ince Memed", None).await;

		let loan = lend_book(&db, lend(id)).await.unwrap();
		assert!(!loan.is_returned);
		assert!(flags(&db, id).await.1);

		let returned = return_book(&db, loan.id, None).await.unwrap();
		assert!(returned.is_returned);
		assert!(returned.actual_return_date.is_some());
		assert!(!flags(&db, id).await.1);
		assert_eq!(count(&db, "SELECT COUNT(*) FROM borrowed_books WHERE book_id = ?", id).await, 1);
	}

	#[tokio::test]
	async fn double_lend_is_a_conflict() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Calikusu", None).await;
		lend_book(&db, lend(id)).await.unwrap();

		let err = lend_book(&db, lend(id)).await.unwrap_err();
		assert!(matches!(err, LibraryError::Conflict(_)));
		assert_eq!(count(&db, "SELECT COUNT(*) FROM borrowed_books WHERE book_id = ? AND is_returned = 0", id).await, 1);

		let err = lend_book(&db, lend(404)).await.unwrap_err();
		assert!(matches!(err, LibraryError::NotFound(_)));
	}

	#[tokio::test]
	async fn open_loan_index_wins_over_stale_flag() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Yaprak Dokumu", None).await;
		// an open loan the flag does not know about, as after a lost race
		sqlx::query("INSERT INTO borrowed_books (book_id, borrower_name, borrowed_date) VALUES (?, 'Can', '2024-03-01')")
			.bind(id)
			.execute(db.pool())
			.await
			.unwrap();

		let err = lend_book(&db, lend(id)).await.unwrap_err();
		assert!(matches!(err, LibraryError::Conflict(ref m) if m == "Book is already borrowed"));
		// the flag flip rolled back with the failed insert
		assert!(!flags(&db, id).await.1);
		assert_eq!(count(&db, "SELECT COUNT(*) FROM borrowed_books WHERE book_id = ?", id).await, 1);
	}

	#[tokio::test]
	async fn active_reading_index_maps_to_conflict() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Huzur", Some(400)).await;
		start_reading(&db, StartReading { book_id: id, current_page: 1, total_pages: None, notes: None })
			.await
			.unwrap();

		let err = sqlx::query("INSERT INTO currently_reading (book_id, current_page, started_date, last_read_date) VALUES (?, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')")
			.bind(id)
			.execute(db.pool())
			.await
			.unwrap_err();
		let err = LibraryError::unique_or(err, "Book is already in currently reading list");
		assert!(matches!(err, LibraryError::Conflict(_)));

		// other database failures stay internal
		let err = sqlx::query("INSERT INTO currently_reading (book_id, current_page) VALUES (?, 1)")
			.bind(9999)
			.execute(db.pool())
			.await
			.unwrap_err();
		assert!(matches!(LibraryError::unique_or(err, "unused"), LibraryError::Database(_)));
	}

	#[tokio::test]
	async fn return_twice_or_unknown() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Aylak Adam", None).await;
		let loan = lend_book(&db, lend(id)).await.unwrap();
		let on = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();

		assert_eq!(return_book(&db, loan.id, Some(on)).await.unwrap().actual_return_date, Some(on));
		assert!(matches!(return_book(&db, loan.id, None).await, Err(LibraryError::Conflict(_))));
		assert!(matches!(return_book(&db, 77, None).await, Err(LibraryError::NotFound(_))));
	}

	#[tokio::test]
	async fn progress_follows_book_pages() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Kurk Mantolu Madonna", Some(200)).await;

		let entry = start_reading(&db, StartReading { book_id: id, current_page: 50, total_pages: None, notes: None })
			.await
			.unwrap();
		assert_eq!(entry.total_pages, Some(200));
		assert_eq!(entry.reading_progress, 25.0);

		let entry = update_progress(&db, entry.id, Progress { current_page: 150, total_pages: None, notes: None })
			.await
			.unwrap();
		assert_eq!(entry.reading_progress, 75.0);
		assert_eq!(entry.current_page, 150);
	}

	#[tokio::test]
	async fn second_start_is_a_conflict() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Sefiller", None).await;
		let start = StartReading { book_id: id, current_page: 1, total_pages: None, notes: None };

		let first = start_reading(&db, start.clone()).await.unwrap();
		assert_eq!(first.reading_progress, 0.0);
		assert!(matches!(start_reading(&db, start.clone()).await, Err(LibraryError::Conflict(_))));

		// once finished, the book may be started again
		finish_reading(&db, first.id).await.unwrap();
		start_reading(&db, start).await.unwrap();
		assert_eq!(count(&db, "SELECT COUNT(*) FROM currently_reading WHERE book_id = ? AND is_active = 1", id).await, 1);
	}

	#[tokio::test]
	async fn finished_entries_reject_updates() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Yaban", Some(100)).await;
		let entry = start_reading(&db, StartReading { book_id: id, current_page: 10, total_pages: None, notes: None })
			.await
			.unwrap();

		let done = finish_reading(&db, entry.id).await.unwrap();
		assert!(!done.is_active);
		assert!(!flags(&db, id).await.0);

		let progress = Progress { current_page: 20, total_pages: None, notes: None };
		assert!(matches!(update_progress(&db, entry.id, progress).await, Err(LibraryError::NotFound(_))));
		assert!(matches!(finish_reading(&db, entry.id).await, Err(LibraryError::NotFound(_))));
	}

	#[tokio::test]
	async fn remove_deletes_regardless_of_state() {
		let db = Db::open_in_memory().await.unwrap();
		let id = book(&db, "Huzur", None).await;
		let entry = start_reading(&db, StartReading { book_id: id, current_page: 5, total_pages: Some(50), notes: None })
			.await
			.unwrap();
		finish_reading(&db, entry.id).await.unwrap();

		remove_from_currently_reading(&db, entry.id).await.unwrap();
		assert!(matches!(reading_entry(&db, entry.id).await, Err(LibraryError::NotFound(_))));
		assert!(matches!(remove_from_currently_reading(&db, entry.id).await, Err(LibraryError::NotFound(_))));
	}

	#[tokio::test]
	async fn start_reading_unknown_book() {
		let db = Db::open_in_memory().await.unwrap();
		let start = StartReading { book_id: 5, current_page: 1, total_pages: None, notes: None };
		assert!(matches!(start_reading(&db, start).await, Err(LibraryError::NotFound(_))));
	}
}
