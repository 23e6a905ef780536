use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{FieldError, LibraryError, Result};
use crate::time::{normalize_finish_date, DateError, RawDate};
use crate::tracker::{Lend, MarkRead, Progress, StartReading};

pub type Bid = i64;
pub type Aid = i64;
pub type Cid = i64;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Book {
	pub id: Bid,
	pub title: String,
	pub author_id: Option<Aid>,
	pub author_first_name: Option<String>,
	pub author_last_name: Option<String>,
	pub category_id: Option<Cid>,
	pub sub_category: Option<String>,
	pub translator: Option<String>,
	pub description: Option<String>,
	pub pages: Option<i64>,
	pub publication_year: Option<i64>,
	pub publisher: Option<String>,
	pub language: Option<String>,
	pub price: Option<f64>,
	pub rating: Option<i64>,
	pub is_read: bool,
	pub is_wishlist: bool,
	pub is_borrowed: bool,
	pub notes: Option<String>,
	pub cover_image_url: Option<String>,
	pub date_added: NaiveDate,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A book row joined with its display author and category.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BookListing {
	#[sqlx(flatten)]
	#[serde(flatten)]
	pub book: Book,
	pub author_name: Option<String>,
	pub category_name: Option<String>,
	pub category_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookDetails {
	#[serde(flatten)]
	pub listing: BookListing,
	pub reading_history: Vec<ReadingHistoryEntry>,
	pub borrowed_history: Vec<BorrowedBookEntry>,
}

/// Reading history exactly as stored; `finish_date` may be ISO text or epoch millis.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
	pub id: i64,
	pub book_id: Bid,
	pub start_date: Option<String>,
	pub finish_date: String,
	pub rating: Option<i64>,
	pub notes: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingHistoryEntry {
	pub id: i64,
	pub book_id: Bid,
	pub start_date: Option<String>,
	pub finish_date: DateTime<Utc>,
	pub rating: Option<i64>,
	pub notes: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for ReadingHistoryEntry {
	type Error = DateError;

	fn try_from(row: HistoryRow) -> std::result::Result<Self, DateError> {
		Ok(ReadingHistoryEntry {
			finish_date: normalize_finish_date(&row.finish_date)?,
			id: row.id,
			book_id: row.book_id,
			start_date: row.start_date,
			rating: row.rating,
			notes: row.notes,
			created_at: row.created_at,
		})
	}
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryListingRow {
	#[sqlx(flatten)]
	pub history: HistoryRow,
	pub title: String,
	pub pages: Option<i64>,
	pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryListing {
	#[serde(flatten)]
	pub entry: ReadingHistoryEntry,
	pub title: String,
	pub pages: Option<i64>,
	pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CurrentlyReadingEntry {
	pub id: i64,
	pub book_id: Bid,
	pub current_page: i64,
	pub total_pages: Option<i64>,
	pub reading_progress: f64,
	pub started_date: DateTime<Utc>,
	pub last_read_date: DateTime<Utc>,
	pub notes: Option<String>,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CurrentlyReadingListing {
	#[sqlx(flatten)]
	#[serde(flatten)]
	pub entry: CurrentlyReadingEntry,
	pub title: String,
	pub publisher: Option<String>,
	pub publication_year: Option<i64>,
	pub rating: Option<i64>,
	pub is_read: bool,
	pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BorrowedBookEntry {
	pub id: i64,
	pub book_id: Bid,
	pub borrower_name: String,
	pub borrower_contact: Option<String>,
	pub borrowed_date: NaiveDate,
	pub expected_return_date: Option<NaiveDate>,
	pub actual_return_date: Option<NaiveDate>,
	pub notes: Option<String>,
	pub is_returned: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BorrowedRow {
	#[sqlx(flatten)]
	#[serde(flatten)]
	pub entry: BorrowedBookEntry,
	pub title: String,
	pub publisher: Option<String>,
	pub author_name: String,
}

/// Days a book has been out; past this a loan counts as overdue.
pub const OVERDUE_AFTER_DAYS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorrowedListing {
	#[serde(flatten)]
	pub row: BorrowedRow,
	pub days_borrowed: i64,
	pub is_overdue: bool,
}

impl BorrowedListing {
	pub fn new(row: BorrowedRow, today: NaiveDate) -> Self {
		let days_borrowed = crate::time::days_between(row.entry.borrowed_date, today);
		let is_overdue = days_borrowed > OVERDUE_AFTER_DAYS && !row.entry.is_returned;
		BorrowedListing { row, days_borrowed, is_overdue }
	}
}

/// Minimal book view used by the "pick a book" lists.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BookChoice {
	pub id: Bid,
	pub title: String,
	pub pages: Option<i64>,
	pub publisher: Option<String>,
	pub publication_year: Option<i64>,
	pub author_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct WishlistItem {
	pub id: i64,
	pub book_name: String,
	pub author_name: String,
	pub notes: Option<String>,
	pub price: Option<f64>,
	pub publisher: Option<String>,
	pub is_purchased: bool,
	pub added_date: NaiveDate,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Category {
	pub id: Cid,
	pub name: String,
	pub description: Option<String>,
	pub color: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CategoryWithCount {
	#[sqlx(flatten)]
	#[serde(flatten)]
	pub category: Category,
	pub book_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Author {
	pub id: Aid,
	pub name: String,
	pub biography: Option<String>,
	pub nationality: Option<String>,
	pub birth_date: Option<NaiveDate>,
	pub death_date: Option<NaiveDate>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct AuthorWithCount {
	#[sqlx(flatten)]
	#[serde(flatten)]
	pub author: Author,
	pub book_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
	pub page: i64,
	pub limit: i64,
	pub total: i64,
	pub pages: i64,
}

impl Pagination {
	pub fn new(page: i64, limit: i64, total: i64) -> Self {
		let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
		Pagination { page, limit, total, pages }
	}

	pub fn offset(&self) -> i64 {
		(self.page - 1).max(0).saturating_mul(self.limit)
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
	pub data: Vec<T>,
	pub pagination: Pagination,
}

// ---- validation ----

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Checks(Vec<FieldError>);

impl Checks {
	pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
		if !ok {
			self.0.push(FieldError::new(field, message));
		}
	}

	pub fn required(&mut self, value: &Option<String>, field: &'static str, message: &str) {
		let present = value.as_deref().map_or(false, |v| !v.trim().is_empty());
		self.check(present, field, message);
	}

	pub fn not_blank(&mut self, value: &Option<String>, field: &'static str, message: &str) {
		if let Some(v) = value {
			self.check(!v.trim().is_empty(), field, message);
		}
	}

	pub fn range(&mut self, value: Option<i64>, min: i64, max: i64, field: &'static str, message: &str) {
		if let Some(v) = value {
			self.check((min..=max).contains(&v), field, message);
		}
	}

	pub fn non_negative(&mut self, value: Option<f64>, field: &'static str, message: &str) {
		if let Some(v) = value {
			self.check(v.is_finite() && v >= 0.0, field, message);
		}
	}

	pub fn date(&mut self, value: Option<&RawDate>, field: &'static str) -> Option<DateTime<Utc>> {
		let raw = value?;
		match raw.to_datetime() {
			Ok(dt) => Some(dt),
			Err(e) => {
				self.0.push(FieldError::new(field, format!("Invalid date: {e}")));
				None
			}
		}
	}

	pub fn finish(self) -> Result<()> {
		if self.0.is_empty() {
			Ok(())
		} else {
			Err(LibraryError::Validation(self.0))
		}
	}
}

/// Trims free text; blank becomes absent.
pub fn clean(text: Option<String>) -> Option<String> {
	text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

// zero is "not filled in" for these optional numeric form fields
fn filled(value: Option<i64>) -> Option<i64> {
	value.filter(|v| *v != 0)
}

pub const RATING_MESSAGE: &str = "Rating must be between 1 and 5";

// ---- books ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBook {
	pub title: Option<String>,
	pub author_id: Option<Aid>,
	pub author_first_name: Option<String>,
	pub author_last_name: Option<String>,
	pub category_id: Option<Cid>,
	pub sub_category: Option<String>,
	pub translator: Option<String>,
	pub description: Option<String>,
	pub pages: Option<i64>,
	pub publication_year: Option<i64>,
	pub publisher: Option<String>,
	pub language: Option<String>,
	pub price: Option<f64>,
	pub rating: Option<i64>,
	pub is_read: Option<bool>,
	pub is_wishlist: Option<bool>,
	pub notes: Option<String>,
	pub cover_image_url: Option<String>,
}

fn check_book_numbers(checks: &mut Checks, pages: Option<i64>, year: Option<i64>, price: Option<f64>, rating: Option<i64>) {
	checks.non_negative(price, "price", "Price must be a positive number");
	checks.range(year, 1000, 2030, "publication_year", "Publication year must be between 1000 and 2030");
	checks.range(pages, 1, i64::MAX, "pages", "Pages must be a positive integer");
	checks.range(rating, 1, 5, "rating", RATING_MESSAGE);
}

impl NewBook {
	pub fn validated(mut self) -> Result<NewBook> {
		self.pages = filled(self.pages);
		self.publication_year = filled(self.publication_year);
		self.rating = filled(self.rating);

		let mut checks = Checks::default();
		checks.required(&self.title, "title", "Title is required");
		check_book_numbers(&mut checks, self.pages, self.publication_year, self.price, self.rating);
		checks.finish()?;

		self.title = clean(self.title);
		self.author_first_name = clean(self.author_first_name);
		self.author_last_name = clean(self.author_last_name);
		self.sub_category = clean(self.sub_category);
		Ok(self)
	}
}

/// Partial book update. `is_borrowed` is deliberately absent: it only moves
/// through lending and returning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookChanges {
	pub title: Option<String>,
	pub author_id: Option<Aid>,
	pub author_first_name: Option<String>,
	pub author_last_name: Option<String>,
	pub category_id: Option<Cid>,
	pub sub_category: Option<String>,
	pub translator: Option<String>,
	pub description: Option<String>,
	pub pages: Option<i64>,
	pub publication_year: Option<i64>,
	pub publisher: Option<String>,
	pub language: Option<String>,
	pub price: Option<f64>,
	pub rating: Option<i64>,
	pub is_read: Option<bool>,
	pub is_wishlist: Option<bool>,
	pub notes: Option<String>,
	pub cover_image_url: Option<String>,
}

impl BookChanges {
	pub fn validated(mut self) -> Result<BookChanges> {
		self.pages = filled(self.pages);
		self.publication_year = filled(self.publication_year);
		self.rating = filled(self.rating);

		let mut checks = Checks::default();
		checks.not_blank(&self.title, "title", "Title cannot be empty");
		check_book_numbers(&mut checks, self.pages, self.publication_year, self.price, self.rating);
		checks.finish()?;

		self.title = self.title.map(|t| t.trim().to_string());
		Ok(self)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
	Title,
	#[default]
	CreatedAt,
	UpdatedAt,
	DateAdded,
	PublicationYear,
	Pages,
	Price,
	Rating,
	AuthorLastName,
}

impl BookSort {
	pub fn column(self) -> &'static str {
		match self {
			BookSort::Title => "title",
			BookSort::CreatedAt => "created_at",
			BookSort::UpdatedAt => "updated_at",
			BookSort::DateAdded => "date_added",
			BookSort::PublicationYear => "publication_year",
			BookSort::Pages => "pages",
			BookSort::Price => "price",
			BookSort::Rating => "rating",
			BookSort::AuthorLastName => "author_last_name",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
	Asc,
	#[default]
	Desc,
}

impl SortOrder {
	pub fn sql(self) -> &'static str {
		match self {
			SortOrder::Asc => "ASC",
			SortOrder::Desc => "DESC",
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
	pub page: Option<i64>,
	pub limit: Option<i64>,
	pub search: Option<String>,
	pub category: Option<Cid>,
	pub author: Option<String>,
	pub is_read: Option<bool>,
	pub is_wishlist: Option<bool>,
	pub is_borrowed: Option<bool>,
	pub sort: Option<BookSort>,
	pub order: Option<SortOrder>,
}

/// Highest page a listing accepts; keeps `(page - 1) * limit` well inside i64.
pub const MAX_PAGE: i64 = 1_000_000;

pub fn page_params(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Result<(i64, i64)> {
	let page = page.unwrap_or(1);
	let limit = limit.unwrap_or(default_limit);
	let mut checks = Checks::default();
	checks.check((1..=MAX_PAGE).contains(&page), "page", "Page must be between 1 and 1000000");
	checks.check((1..=500).contains(&limit), "limit", "Limit must be between 1 and 500");
	checks.finish()?;
	Ok((page, limit))
}

// ---- reading state ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkReadForm {
	pub rating: Option<i64>,
	pub notes: Option<String>,
	pub finish_date: Option<RawDate>,
}

impl MarkReadForm {
	pub fn validated(self) -> Result<MarkRead> {
		let rating = filled(self.rating);
		let mut checks = Checks::default();
		checks.range(rating, 1, 5, "rating", RATING_MESSAGE);
		let finish_date = checks.date(self.finish_date.as_ref(), "finish_date");
		checks.finish()?;
		Ok(MarkRead { rating, notes: clean(self.notes), finish_date })
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LendForm {
	pub book_id: Option<Bid>,
	pub borrower_name: Option<String>,
	pub borrower_contact: Option<String>,
	pub borrowed_date: Option<RawDate>,
	pub expected_return_date: Option<RawDate>,
	pub notes: Option<String>,
}

impl LendForm {
	pub fn validated(self) -> Result<Lend> {
		let mut checks = Checks::default();
		checks.check(self.book_id.is_some(), "book_id", "Book ID is required");
		checks.required(&self.borrower_name, "borrower_name", "Borrower name is required");
		checks.check(self.borrowed_date.is_some(), "borrowed_date", "Valid borrowed date is required");
		let borrowed = checks.date(self.borrowed_date.as_ref(), "borrowed_date");
		let expected = checks.date(self.expected_return_date.as_ref(), "expected_return_date");
		checks.finish()?;

		match (self.book_id, clean(self.borrower_name), borrowed) {
			(Some(book_id), Some(borrower_name), Some(borrowed)) => Ok(Lend {
				book_id,
				borrower_name,
				borrower_contact: clean(self.borrower_contact),
				borrowed_date: borrowed.date_naive(),
				expected_return_date: expected.map(|d| d.date_naive()),
				notes: clean(self.notes),
			}),
			_ => Err(LibraryError::invalid("body", "Incomplete lend request")),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnForm {
	pub actual_return_date: Option<RawDate>,
}

impl ReturnForm {
	pub fn validated(self) -> Result<Option<NaiveDate>> {
		let mut checks = Checks::default();
		let date = checks.date(self.actual_return_date.as_ref(), "actual_return_date");
		checks.finish()?;
		Ok(date.map(|d| d.date_naive()))
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartReadingForm {
	pub book_id: Option<Bid>,
	pub current_page: Option<i64>,
	pub total_pages: Option<i64>,
	pub notes: Option<String>,
}

impl StartReadingForm {
	pub fn validated(self) -> Result<StartReading> {
		let mut checks = Checks::default();
		checks.check(self.book_id.is_some(), "book_id", "Book ID is required");
		checks.check(self.current_page.map_or(false, |p| p >= 1), "current_page", "Current page must be at least 1");
		checks.range(self.total_pages, 1, i64::MAX, "total_pages", "Total pages must be at least 1");
		checks.finish()?;

		match (self.book_id, self.current_page) {
			(Some(book_id), Some(current_page)) => Ok(StartReading {
				book_id,
				current_page,
				total_pages: self.total_pages,
				notes: clean(self.notes),
			}),
			_ => Err(LibraryError::invalid("body", "Incomplete reading request")),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressForm {
	pub current_page: Option<i64>,
	pub total_pages: Option<i64>,
	pub notes: Option<String>,
}

impl ProgressForm {
	pub fn validated(self) -> Result<Progress> {
		let mut checks = Checks::default();
		checks.check(self.current_page.map_or(false, |p| p >= 1), "current_page", "Current page must be at least 1");
		checks.range(self.total_pages, 1, i64::MAX, "total_pages", "Total pages must be at least 1");
		checks.finish()?;

		Ok(Progress {
			current_page: self.current_page.unwrap_or(1),
			total_pages: self.total_pages,
			notes: clean(self.notes),
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
	#[default]
	All,
	Active,
	Returned,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BorrowedQuery {
	pub status: Option<BorrowStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
	pub page: Option<i64>,
	pub limit: Option<i64>,
	pub year: Option<i32>,
}

// ---- wishlist ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWish {
	pub book_name: Option<String>,
	pub author_name: Option<String>,
	pub notes: Option<String>,
	pub price: Option<f64>,
	pub publisher: Option<String>,
}

impl NewWish {
	pub fn validated(self) -> Result<NewWish> {
		let mut checks = Checks::default();
		checks.required(&self.book_name, "book_name", "Book name is required");
		checks.required(&self.author_name, "author_name", "Author name is required");
		checks.non_negative(self.price, "price", "Price must be a positive number");
		checks.finish()?;

		Ok(NewWish {
			book_name: clean(self.book_name),
			author_name: clean(self.author_name),
			notes: clean(self.notes),
			// 0 means "price unknown" on the wishlist form
			price: self.price.filter(|p| *p > 0.0),
			publisher: clean(self.publisher),
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WishChanges {
	pub book_name: Option<String>,
	pub author_name: Option<String>,
	pub notes: Option<String>,
	pub price: Option<f64>,
	pub publisher: Option<String>,
	pub is_purchased: Option<bool>,
}

impl WishChanges {
	pub fn validated(self) -> Result<WishChanges> {
		let mut checks = Checks::default();
		checks.not_blank(&self.book_name, "book_name", "Book name cannot be empty");
		checks.not_blank(&self.author_name, "author_name", "Author name cannot be empty");
		checks.non_negative(self.price, "price", "Price must be a positive number");
		checks.finish()?;

		Ok(WishChanges {
			book_name: self.book_name.map(|v| v.trim().to_string()),
			author_name: self.author_name.map(|v| v.trim().to_string()),
			notes: self.notes.map(|v| v.trim().to_string()),
			publisher: self.publisher.map(|v| v.trim().to_string()),
			..self
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
	pub search: Option<String>,
}

impl SearchQuery {
	pub fn pattern(&self) -> Option<String> {
		self.search.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(|s| format!("%{s}%"))
	}
}

// ---- categories ----

pub const DEFAULT_CATEGORY_COLOR: &str = "#6366f1";

fn is_hex_color(color: &str) -> bool {
	color.len() == 7
		&& color.starts_with('#')
		&& color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
	pub name: Option<String>,
	pub description: Option<String>,
	pub color: Option<String>,
}

impl NewCategory {
	pub fn validated(self) -> Result<NewCategory> {
		let mut checks = Checks::default();
		checks.required(&self.name, "name", "Category name is required");
		if let Some(color) = &self.color {
			checks.check(is_hex_color(color), "color", "Color must be a valid hex color");
		}
		checks.finish()?;

		Ok(NewCategory {
			name: clean(self.name),
			description: clean(self.description),
			color: self.color,
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryChanges {
	pub name: Option<String>,
	pub description: Option<String>,
	pub color: Option<String>,
}

impl CategoryChanges {
	pub fn validated(self) -> Result<CategoryChanges> {
		let mut checks = Checks::default();
		checks.not_blank(&self.name, "name", "Category name cannot be empty");
		if let Some(color) = &self.color {
			checks.check(is_hex_color(color), "color", "Color must be a valid hex color");
		}
		checks.finish()?;
		Ok(CategoryChanges { name: self.name.map(|n| n.trim().to_string()), ..self })
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubcategoryQuery {
	pub subcategory: Option<String>,
}

// ---- authors ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorForm {
	pub name: Option<String>,
	pub biography: Option<String>,
	pub nationality: Option<String>,
	pub birth_date: Option<RawDate>,
	pub death_date: Option<RawDate>,
}

/// Author fields after validation; `name` is only absent on partial updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorFields {
	pub name: Option<String>,
	pub biography: Option<String>,
	pub nationality: Option<String>,
	pub birth_date: Option<NaiveDate>,
	pub death_date: Option<NaiveDate>,
}

impl AuthorForm {
	/// `creating` demands a name; updates only reject a blank one.
	pub fn validated(self, creating: bool) -> Result<AuthorFields> {
		let mut checks = Checks::default();
		if creating {
			checks.required(&self.name, "name", "Author name is required");
		} else {
			checks.not_blank(&self.name, "name", "Author name cannot be empty");
		}
		let birth = checks.date(self.birth_date.as_ref(), "birth_date");
		let death = checks.date(self.death_date.as_ref(), "death_date");
		checks.finish()?;

		Ok(AuthorFields {
			name: clean(self.name),
			biography: clean(self.biography),
			nationality: clean(self.nationality),
			birth_date: birth.map(|d| d.date_naive()),
			death_date: death.map(|d| d.date_naive()),
		})
	}
}

// ---- stats ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YearQuery {
	pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
	pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_book_reports_every_bad_field() {
		let form = NewBook {
			title: Some("   ".into()),
			pages: Some(-3),
			publication_year: Some(3000),
			price: Some(-1.0),
			rating: Some(6),
			..Default::default()
		};
		let Err(LibraryError::Validation(errors)) = form.validated() else {
			panic!("expected validation failure");
		};
		let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
		assert_eq!(fields, ["title", "price", "publication_year", "pages", "rating"]);
	}

	#[test]
	fn new_book_treats_zero_as_unset() {
		let form = NewBook {
			title: Some(" Dune ".into()),
			pages: Some(0),
			rating: Some(0),
			author_first_name: Some(" ".into()),
			..Default::default()
		};
		let book = form.validated().unwrap();
		assert_eq!(book.title.as_deref(), Some("Dune"));
		assert_eq!(book.pages, None);
		assert_eq!(book.rating, None);
		assert_eq!(book.author_first_name, None);
	}

	#[test]
	fn lend_form_requires_core_fields() {
		let Err(LibraryError::Validation(errors)) = LendForm::default().validated() else {
			panic!("expected validation failure");
		};
		let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
		assert_eq!(fields, ["book_id", "borrower_name", "borrowed_date"]);

		let lend = LendForm {
			book_id: Some(4),
			borrower_name: Some(" Ayse ".into()),
			borrowed_date: Some(RawDate::Text("2024-05-01T10:00:00.000Z".into())),
			..Default::default()
		}
		.validated()
		.unwrap();
		assert_eq!(lend.borrower_name, "Ayse");
		assert_eq!(lend.borrowed_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
	}

	#[test]
	fn mark_read_rejects_bad_date() {
		let form = MarkReadForm {
			finish_date: Some(RawDate::Text("yesterday".into())),
			..Default::default()
		};
		assert!(matches!(form.validated(), Err(LibraryError::Validation(_))));
	}

	#[test]
	fn reading_forms_need_a_positive_page() {
		let form = StartReadingForm { book_id: Some(1), current_page: Some(0), ..Default::default() };
		assert!(form.validated().is_err());
		let form = ProgressForm { current_page: Some(12), total_pages: Some(0), ..Default::default() };
		assert!(form.validated().is_err());
	}

	#[test]
	fn category_color_must_be_hex() {
		let ok = NewCategory { name: Some("Poetry".into()), color: Some("#A1b2C3".into()), ..Default::default() };
		assert!(ok.validated().is_ok());
		let bad = NewCategory { name: Some("Poetry".into()), color: Some("red".into()), ..Default::default() };
		assert!(bad.validated().is_err());
	}

	#[test]
	fn page_params_bound_page_and_limit() {
		assert_eq!(page_params(None, None, 20).unwrap(), (1, 20));
		assert_eq!(page_params(Some(MAX_PAGE), Some(500), 50).unwrap(), (MAX_PAGE, 500));

		let Err(LibraryError::Validation(errors)) = page_params(Some(i64::MAX), Some(500), 50) else {
			panic!("expected validation failure");
		};
		assert_eq!(errors[0].field, "page");
		assert!(page_params(Some(0), None, 50).is_err());
		assert!(page_params(None, Some(501), 50).is_err());
	}

	#[test]
	fn pagination_rounds_up() {
		let p = Pagination::new(2, 50, 101);
		assert_eq!(p.pages, 3);
		assert_eq!(p.offset(), 50);
		assert_eq!(Pagination::new(1, 50, 0).pages, 0);
	}

	#[test]
	fn overdue_after_sixty_days() {
		let borrowed = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
		let row = BorrowedRow {
			entry: BorrowedBookEntry {
				id: 1,
				book_id: 1,
				borrower_name: "Mehmet".into(),
				borrower_contact: None,
				borrowed_date: borrowed,
				expected_return_date: None,
				actual_return_date: None,
				notes: None,
				is_returned: false,
				created_at: Utc::now(),
				updated_at: Utc::now(),
			},
			title: "Kuyucakli Yusuf".into(),
			publisher: None,
			author_name: "Sabahattin Ali".into(),
		};
		let at_sixty = BorrowedListing::new(row.clone(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
		assert_eq!(at_sixty.days_borrowed, 60);
		assert!(!at_sixty.is_overdue);
		let later = BorrowedListing::new(row, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
		assert!(later.is_overdue);
	}
}
