//! Scroll loop for listings that append content as the viewport nears the
//! bottom.

use anyhow::Result;
use std::time::Duration;

use crate::browser::PageSession;
use crate::engine::RunContext;
use crate::strategy::ScrollRule;

/// Scroll until the document stops growing, the round cap is hit, or the
/// run budget expires. Returns the number of scroll rounds performed.
pub async fn scroll_to_bottom(
    session: &mut dyn PageSession,
    rule: &ScrollRule,
    ctx: &RunContext,
) -> Result<u32> {
    let mut height = document_height(session).await?;
    let mut stalled = 0u32;
    let mut rounds = 0u32;

    for _ in 0..rule.max_rounds {
        if ctx.expired() {
            break;
        }
        session
            .execute_js("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        let settle = Duration::from_millis(rule.settle_ms).min(ctx.remaining());
        tokio::time::sleep(settle).await;
        rounds += 1;

        let new_height = document_height(session).await?;
        if new_height > height {
            height = new_height;
            stalled = 0;
        } else {
            stalled += 1;
            if stalled >= rule.no_growth_limit {
                break;
            }
        }
    }

    tracing::debug!("scroll finished after {rounds} rounds, height {height}px");
    Ok(rounds)
}

async fn document_height(session: &mut dyn PageSession) -> Result<u64> {
    let value = session.execute_js("document.body.scrollHeight").await?;
    Ok(value.as_f64().unwrap_or(0.0) as u64)
}
