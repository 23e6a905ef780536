use axum::{
	extract::rejection::{JsonRejection, PathRejection, QueryRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::time::DateError;

pub type Result<T> = std::result::Result<T, LibraryError>;

/// One failed field of a request body or query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
	pub field: &'static str,
	pub message: String,
}

impl FieldError {
	pub fn new(field: &'static str, message: impl Into<String>) -> Self {
		FieldError { field, message: message.into() }
	}
}

#[derive(Error, Debug)]
pub enum LibraryError {
	#[error("validation failed: {}", describe(.0))]
	Validation(Vec<FieldError>),

	#[error("{0}")]
	NotFound(&'static str),

	#[error("{0}")]
	Conflict(String),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("stored date unreadable: {0}")]
	Date(#[from] DateError),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

fn describe(errors: &[FieldError]) -> String {
	errors.iter()
		.map(|e| format!("{}: {}", e.field, e.message))
		.collect::<Vec<_>>()
		.join(", ")
}

impl LibraryError {
	pub fn conflict(message: impl Into<String>) -> Self {
		LibraryError::Conflict(message.into())
	}

	pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
		LibraryError::Validation(vec![FieldError::new(field, message)])
	}

	/// Turns a unique-index violation into a Conflict carrying `message`,
	/// anything else stays a database error.
	pub fn unique_or(err: sqlx::Error, message: &str) -> Self {
		match &err {
			sqlx::Error::Database(db) if db.is_unique_violation() => LibraryError::conflict(message),
			_ => LibraryError::Database(err),
		}
	}

	pub fn status(&self) -> StatusCode {
		match self {
			LibraryError::Validation(_) | LibraryError::Conflict(_) => StatusCode::BAD_REQUEST,
			LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
			LibraryError::Database(_) | LibraryError::Date(_) | LibraryError::Config(_) | LibraryError::Io(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

/// Detail of a 500 response, attached as a response extension so the
/// development-mode layer can expose it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for LibraryError {
	fn into_response(self) -> Response {
		let status = self.status();
		match self {
			LibraryError::Validation(errors) => {
				debug!("rejected request: {}", describe(&errors));
				(status, Json(json!({ "errors": errors }))).into_response()
			}
			LibraryError::NotFound(what) => {
				debug!("{what}");
				(status, Json(json!({ "error": what }))).into_response()
			}
			LibraryError::Conflict(message) => {
				warn!("conflict: {message}");
				(status, Json(json!({ "error": message }))).into_response()
			}
			other => {
				error!("unexpected failure: {other}");
				let mut response = (status, Json(json!({ "error": "Something went wrong!" }))).into_response();
				response.extensions_mut().insert(ErrorDetail(other.to_string()));
				response
			}
		}
	}
}

impl From<JsonRejection> for LibraryError {
	fn from(rejection: JsonRejection) -> Self {
		LibraryError::invalid("body", rejection.body_text())
	}
}

impl From<QueryRejection> for LibraryError {
	fn from(rejection: QueryRejection) -> Self {
		LibraryError::invalid("query", rejection.body_text())
	}
}

impl From<PathRejection> for LibraryError {
	fn from(rejection: PathRejection) -> Self {
		LibraryError::invalid("path", rejection.body_text())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn statuses_follow_taxonomy() {
		assert_eq!(LibraryError::invalid("title", "Title is required").status(), StatusCode::BAD_REQUEST);
		assert_eq!(LibraryError::NotFound("Book not found").status(), StatusCode::NOT_FOUND);
		assert_eq!(LibraryError::conflict("Book is already borrowed").status(), StatusCode::BAD_REQUEST);
		assert_eq!(LibraryError::Config("PORT".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn internal_errors_carry_detail_extension() {
		let response = LibraryError::Config("bad".into()).into_response();
		let detail = response.extensions().get::<ErrorDetail>().map(|d| d.0.clone());
		assert_eq!(detail.as_deref(), Some("configuration error: bad"));

		let response = LibraryError::NotFound("Wish not found").into_response();
		assert!(response.extensions().get::<ErrorDetail>().is_none());
	}

	#[test]
	fn validation_message_lists_fields() {
		let err = LibraryError::Validation(vec![
			FieldError::new("title", "Title is required"),
			FieldError::new("pages", "Pages must be a positive integer"),
		]);
		assert_eq!(
			err.to_string(),
			"validation failed: title: Title is required, pages: Pages must be a positive integer"
		);
	}
}
