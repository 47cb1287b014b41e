//! Mechanics behind each extraction strategy: cursor arithmetic, scroll
//! loops, login flows, request capture, and bounded link exploration.
//!
//! Runners compose these against the rules carried by their
//! [`crate::strategy::StrategyPolicy`].

pub mod auth;
pub mod explore;
pub mod intercept;
pub mod paginate;
pub mod scroll;

pub use auth::{login, AuthOutcome, Credentials};
pub use explore::{candidate_links, explore_site};
pub use intercept::{capture_api_requests, looks_like_api, matches_markers};
pub use paginate::{page_url, RepeatDetector};
pub use scroll::scroll_to_bottom;
