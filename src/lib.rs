// personal library backend

pub mod api;
pub mod authors;
pub mod catalog;
pub mod categories;
pub mod config;
pub mod error;
pub mod pages;
pub mod sql;
pub mod stats;
pub mod time;
pub mod tracker;
pub mod types;
pub mod wishlist;

pub use api::{router, AppState};
pub use config::Config;
pub use error::{LibraryError, Result};
pub use sql::Db;
