use std::str::FromStr;
use std::time::Duration;

use sqlx::query_builder::Separated;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Encode, Executor, Sqlite, Transaction, Type};
use tracing::{debug, info};

use crate::error::Result;

/// Handle to the library database. Built once at startup and cloned into
/// every request; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Db(SqlitePool);

impl Db {
	pub async fn open(url: &str, max_connections: u32) -> Result<Db> {
		let options = SqliteConnectOptions::from_str(url)?
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.foreign_keys(true)
			.busy_timeout(Duration::from_secs(5));

		let pool = SqlitePoolOptions::new()
			.max_connections(max_connections)
			.acquire_timeout(Duration::from_secs(3))
			.connect_with(options)
			.await?;

		let db = Db(pool);
		db.migrate().await?;
		info!("database ready at {url}");
		Ok(db)
	}

	/// Private database for tests. A single connection that is never recycled,
	/// otherwise every new connection would see an empty database.
	pub async fn open_in_memory() -> Result<Db> {
		let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await?;

		let db = Db(pool);
		db.migrate().await?;
		Ok(db)
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.0
	}

	pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
		Ok(self.0.begin().await?)
	}

	pub async fn close(&self) {
		self.0.close().await;
	}

	async fn migrate(&self) -> Result<()> {
		self.0.execute(MIGRATIONS_TABLE).await?;
		for &(id, name, sql) in MIGRATIONS {
			let applied: Option<i64> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
				.bind(id)
				.fetch_optional(&self.0)
				.await?;
			if applied.is_some() {
				continue;
			}

			let mut tx = self.begin().await?;
			(&mut *tx).execute(sql).await?;
			sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
				.bind(id)
				.bind(name)
				.execute(&mut *tx)
				.await?;
			tx.commit().await?;
			debug!("applied migration {id} ({name})");
		}
		Ok(())
	}

	/// Inserts the default categories when none exist yet. Returns how many were added.
	pub async fn seed_default_categories(&self) -> Result<u64> {
		let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
			.fetch_one(&self.0)
			.await?;
		if existing > 0 {
			return Ok(0);
		}

		let mut tx = self.begin().await?;
		for (name, description, color) in DEFAULT_CATEGORIES {
			sqlx::query("INSERT INTO categories (name, description, color) VALUES (?, ?, ?)")
				.bind(name)
				.bind(description)
				.bind(color)
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		info!("seeded {} default categories", DEFAULT_CATEGORIES.len());
		Ok(DEFAULT_CATEGORIES.len() as u64)
	}
}

/// Adds `column = ?` to an UPDATE's SET list when a partial update carries the field.
pub fn set_if<'args, T>(set: &mut Separated<'_, 'args, Sqlite, &'static str>, column: &'static str, value: Option<T>)
where
	T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
{
	if let Some(value) = value {
		set.push(column).push_unseparated(" = ").push_bind_unseparated(value);
	}
}

const MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
	id INTEGER PRIMARY KEY,
	name TEXT NOT NULL UNIQUE,
	applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const MIGRATIONS: &[(i64, &str, &str)] = &[
	(1, "initial_schema", TABLE_SCHEMA),
];

pub const DEFAULT_CATEGORIES: [(&str, &str, &str); 6] = [
	("EDEBIYAT", "Edebiyat ve yazın eserleri", "#3B82F6"),
	("TARIH", "Tarih ve sosyal bilimler", "#10B981"),
	("DIN-MITOLOJI", "Din, tasavvuf ve mitoloji", "#8B5CF6"),
	("FELSEFE", "Felsefe ve düşünce tarihi", "#F59E0B"),
	("HOBI", "Hobi ve yaşam tarzı", "#EF4444"),
	("BILIM ve SANAT", "Bilim, teknoloji ve sanat", "#6366F1"),
];

// timestamps are RFC 3339 UTC text, calendar dates are YYYY-MM-DD
pub const TABLE_SCHEMA: &str = r#"

CREATE TABLE IF NOT EXISTS authors (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT NOT NULL,
	biography TEXT,
	nationality TEXT,
	birth_date TEXT,
	death_date TEXT,
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS categories (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT NOT NULL UNIQUE,
	description TEXT,
	color TEXT NOT NULL DEFAULT '#6366f1',
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS books (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	title TEXT NOT NULL,
	author_id INTEGER REFERENCES authors(id) ON DELETE SET NULL,
	author_first_name TEXT,
	author_last_name TEXT,
	category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
	sub_category TEXT,
	translator TEXT,
	description TEXT,
	pages INTEGER CHECK(pages IS NULL OR pages >= 1),
	publication_year INTEGER,
	publisher TEXT,
	language TEXT DEFAULT 'Turkish',
	price REAL CHECK(price IS NULL OR price >= 0),
	rating INTEGER CHECK(rating IS NULL OR rating BETWEEN 1 AND 5),
	is_read BOOLEAN NOT NULL DEFAULT 0,
	is_wishlist BOOLEAN NOT NULL DEFAULT 0,
	is_borrowed BOOLEAN NOT NULL DEFAULT 0,
	notes TEXT,
	cover_image_url TEXT,
	date_added TEXT NOT NULL DEFAULT (date('now')),
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS books_category ON books(category_id);
CREATE INDEX IF NOT EXISTS books_author_name ON books(author_last_name, author_first_name);

CREATE TABLE IF NOT EXISTS reading_history (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
	start_date TEXT,
	finish_date TEXT NOT NULL,
	rating INTEGER CHECK(rating IS NULL OR rating BETWEEN 1 AND 5),
	notes TEXT,
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS reading_history_book ON reading_history(book_id);

CREATE TABLE IF NOT EXISTS borrowed_books (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
	borrower_name TEXT NOT NULL,
	borrower_contact TEXT,
	borrowed_date TEXT NOT NULL,
	expected_return_date TEXT,
	actual_return_date TEXT,
	notes TEXT,
	is_returned BOOLEAN NOT NULL DEFAULT 0,
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	CHECK((is_returned = 0) OR (actual_return_date IS NOT NULL))
);

-- a book is lent to at most one borrower at a time
CREATE UNIQUE INDEX IF NOT EXISTS borrowed_books_open ON borrowed_books(book_id) WHERE is_returned = 0;

CREATE TABLE IF NOT EXISTS currently_reading (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
	current_page INTEGER NOT NULL,
	total_pages INTEGER,
	reading_progress REAL NOT NULL DEFAULT 0,
	started_date TEXT NOT NULL,
	last_read_date TEXT NOT NULL,
	notes TEXT,
	is_active BOOLEAN NOT NULL DEFAULT 1,
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

-- finished entries stay around, only the active one is unique
CREATE UNIQUE INDEX IF NOT EXISTS currently_reading_active ON currently_reading(book_id) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS wishlist (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	book_name TEXT NOT NULL,
	author_name TEXT NOT NULL,
	notes TEXT,
	price REAL CHECK(price IS NULL OR price >= 0),
	publisher TEXT,
	is_purchased BOOLEAN NOT NULL DEFAULT 0,
	added_date TEXT NOT NULL DEFAULT (date('now')),
	created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
	updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

"#;

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let db = Db::open_in_memory().await.unwrap();
		db.migrate().await.unwrap();

		let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
			.fetch_one(db.pool())
			.await
			.unwrap();
		assert_eq!(applied, MIGRATIONS.len() as i64);
	}

	#[tokio::test]
	async fn seeds_only_once() {
		let db = Db::open_in_memory().await.unwrap();
		assert_eq!(db.seed_default_categories().await.unwrap(), 6);
		assert_eq!(db.seed_default_categories().await.unwrap(), 0);
	}
}
