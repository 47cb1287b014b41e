//! Declarative traversal strategies.
//!
//! A strategy policy describes how an agent moves through its source. It is
//! attached to a descriptor at registration and consulted by the runner; the
//! execution engine never interprets it. The modes mirror the shapes real
//! listing sites take: a single page, numbered pages, an endless scroll, a
//! login wall, a thin client over a private API, or no fixed structure at
//! all.

use serde::Serialize;

/// How an agent traverses its source.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StrategyPolicy {
    /// One fetch, no traversal.
    SinglePage,
    /// Advance a page cursor until the cap, an empty page, or a repeat.
    Paginated(PaginationRule),
    /// Trigger load-more until growth stops or the cap is reached.
    InfiniteScroll(ScrollRule),
    /// Log in before traversal; fall back to public access when credentials
    /// are absent, surfacing a warning instead of failing.
    Authenticated(AuthRule),
    /// Watch the page's background requests to find the data API behind it,
    /// then fetch that endpoint directly.
    NetworkInterception(InterceptRule),
    /// Model-guided probing with explicit stop conditions.
    Exploratory(ExploreRule),
}

impl StrategyPolicy {
    /// Short tag for metadata listings and events.
    pub fn mode(&self) -> &'static str {
        match self {
            StrategyPolicy::SinglePage => "single_page",
            StrategyPolicy::Paginated(_) => "paginated",
            StrategyPolicy::InfiniteScroll(_) => "infinite_scroll",
            StrategyPolicy::Authenticated(_) => "authenticated",
            StrategyPolicy::NetworkInterception(_) => "network_interception",
            StrategyPolicy::Exploratory(_) => "exploratory",
        }
    }
}

/// How the page cursor is written into the URL.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum CursorStyle {
    /// `?<name>=N` query parameter.
    QueryParam { name: String },
    /// `#<name>=N` fragment, for viewers that route entirely client-side.
    Fragment { name: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationRule {
    pub cursor: CursorStyle,
    /// Hard page cap, independent of the caller's item cap.
    pub max_pages: u32,
}

impl Default for PaginationRule {
    fn default() -> Self {
        Self {
            cursor: CursorStyle::QueryParam {
                name: "page".to_string(),
            },
            max_pages: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrollRule {
    /// Hard cap on scroll rounds.
    pub max_rounds: u32,
    /// Consecutive rounds without new items before stopping.
    pub no_growth_limit: u32,
    /// Wait after each scroll for lazy content to land.
    pub settle_ms: u64,
}

impl Default for ScrollRule {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            no_growth_limit: 3,
            settle_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthRule {
    /// Input field carrying the account identifier.
    pub identity_field: String,
    /// Input field carrying the secret.
    pub secret_field: String,
    /// Login page, when it differs from the target URL.
    pub login_url: Option<String>,
    /// Attempt public access when credentials are absent or rejected.
    pub public_fallback: bool,
}

impl Default for AuthRule {
    fn default() -> Self {
        Self {
            identity_field: "email".to_string(),
            secret_field: "password".to_string(),
            login_url: None,
            public_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterceptRule {
    /// Substrings identifying the data endpoint among observed requests.
    pub url_markers: Vec<String>,
    /// How long to let the page issue background requests.
    pub settle_ms: u64,
}

impl Default for InterceptRule {
    fn default() -> Self {
        Self {
            url_markers: Vec::new(),
            settle_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploreRule {
    /// Hard cap on probe iterations.
    pub max_iterations: u32,
    /// Consecutive iterations without new records before stopping.
    pub no_progress_limit: u32,
    /// Hard cap on distinct pages visited.
    pub max_pages: u32,
}

impl Default for ExploreRule {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            no_progress_limit: 2,
            max_pages: 12,
        }
    }
}
