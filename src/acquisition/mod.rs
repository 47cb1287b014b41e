//! Content acquisition: plain HTTP fetching and page-content extraction.
//!
//! Everything here is browser-free. Rendered-page concerns live in
//! [`crate::browser`]; runners combine the two.

pub mod http_client;
pub mod markdown;
pub mod structured;

pub use http_client::{HttpClient, HttpResponse};
pub use markdown::{extract_json_block, parse_markdown_records, records_from_json, MarkdownRecord};
pub use structured::{extract_listing_items, extract_meta_summary, ListingItem, MetaSummary};
