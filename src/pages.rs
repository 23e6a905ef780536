//! Server-rendered overview page.

use axum::extract::State;
use maud::{html, Markup, DOCTYPE};

use crate::api::AppState;
use crate::catalog;
use crate::error::Result;
use crate::stats::{self, Overview, RECENT_ACTIVITY};
use crate::types::{CurrentlyReadingListing, HistoryListing};

pub async fn dashboard(State(state): State<AppState>) -> Result<Markup> {
	let overview = stats::overview(&state.db).await?;
	let reading = catalog::currently_reading(&state.db).await?;
	let recent = stats::recent_activity(&state.db, RECENT_ACTIVITY).await?;
	Ok(render(&overview, &reading, &recent))
}

fn render(overview: &Overview, reading: &[CurrentlyReadingListing], recent: &[HistoryListing]) -> Markup {
	let counts = &overview.counts;
	html! {
		(DOCTYPE)
		html {
			head {
				meta charset="utf-8";
				title { "Library" }
			}
			body {
				h1 { "Library" }
				table {
					tbody {
						tr { th { "Books" } td { (counts.total_books) } }
						tr { th { "Read" } td { (counts.read_books) " (" (overview.reading_percentage) "%)" } }
						tr { th { "Lent out" } td { (counts.borrowed_books) } }
						tr { th { "Wishlist" } td { (counts.wishlist_books) } }
						tr { th { "Authors" } td { (counts.total_authors) } }
						tr { th { "Categories" } td { (counts.total_categories) } }
					}
				}

				h2 { "Currently reading" }
				@if reading.is_empty() {
					p { "Nothing in progress." }
				} @else {
					table {
						thead { tr {
							td { "Title" }
							td { "Author" }
							td { "Page" }
							td { "Progress" }
						} }
						tbody {
							@for entry in reading {
								tr {
									th { (entry.title) }
									td { (entry.author_name.as_deref().unwrap_or("-")) }
									td {
										(entry.entry.current_page)
										@if let Some(total) = entry.entry.total_pages { " / " (total) }
									}
									td {
										progress max="100" value=(entry.entry.reading_progress) {}
										" " (entry.entry.reading_progress) "%"
									}
								}
							}
						}
					}
				}

				h2 { "Recently finished" }
				ul {
					@for item in recent {
						li {
							(item.title)
							@if let Some(author) = &item.author_name { " by " (author) }
							" on " (item.entry.finish_date.format("%Y-%m-%d").to_string())
						}
					}
				}
			}
		}
	}
}
