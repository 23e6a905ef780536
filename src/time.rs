use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
	#[error("date is empty")]
	Empty,
	#[error("unrecognised date '{0}'")]
	Format(String),
	#[error("timestamp {0} is out of range")]
	Range(i64),
}

/// A date as clients send it: ISO 8601 text or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
	Millis(i64),
	Text(String),
}

impl RawDate {
	pub fn to_datetime(&self) -> Result<DateTime<Utc>, DateError> {
		match self {
			RawDate::Millis(ms) => from_millis(*ms),
			RawDate::Text(text) => normalize_finish_date(text),
		}
	}

	pub fn to_date(&self) -> Result<NaiveDate, DateError> {
		self.to_datetime().map(|dt| dt.date_naive())
	}
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, DateError> {
	Utc.timestamp_millis_opt(ms).single().ok_or(DateError::Range(ms))
}

fn midnight(date: NaiveDate) -> Result<DateTime<Utc>, DateError> {
	date.and_hms_opt(0, 0, 0)
		.map(|naive| Utc.from_utc_datetime(&naive))
		.ok_or_else(|| DateError::Format(date.to_string()))
}

/// Canonical form of a stored or submitted finish date.
///
/// Older rows hold epoch milliseconds as bare digits, newer ones ISO text
/// (date only, naive datetime or RFC 3339). Naive values are taken as UTC.
pub fn normalize_finish_date(raw: &str) -> Result<DateTime<Utc>, DateError> {
	let raw = raw.trim();
	if raw.is_empty() {
		return Err(DateError::Empty);
	}

	let digits = raw.strip_prefix('-').unwrap_or(raw);
	if digits.bytes().all(|b| b.is_ascii_digit()) {
		let ms = raw.parse::<i64>().map_err(|_| DateError::Format(raw.to_string()))?;
		return from_millis(ms);
	}

	if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
		return Ok(dt.with_timezone(&Utc));
	}
	for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
			return Ok(Utc.from_utc_datetime(&naive));
		}
	}
	match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
		Ok(date) => midnight(date),
		Err(_) => Err(DateError::Format(raw.to_string())),
	}
}

/// Whole days elapsed from `since` to `until`, never negative.
pub fn days_between(since: NaiveDate, until: NaiveDate) -> i64 {
	(until - since).num_days().max(0)
}
