//! Notification commands.

use anyhow::Result;
use conductor_db::Ledger;

use super::{or_dash, timestamp};

pub async fn pending(ledger: &Ledger, limit: i64) -> Result<String> {
    let notifications = ledger.notifications.pending(limit).await?;
    if notifications.is_empty() {
        return Ok("No pending notifications\n".to_string());
    }

    let mut out = format!(
        "{:<6} {:<14} {:<8} {:<8} {:<7} {:<19} {}\n",
        "ID", "TYPE", "STATUS", "ISSUE", "RETRIES", "CREATED", "TITLE"
    );
    for n in &notifications {
        out.push_str(&format!(
            "{:<6} {:<14} {:<8} {:<8} {:<7} {:<19} {}\n",
            n.id,
            n.notification_type,
            n.status,
            or_dash(n.issue_id),
            n.retry_count,
            timestamp(Some(n.created_at)),
            n.title
        ));
        if let Some(error) = &n.error_message {
            out.push_str(&format!("       last error: {}\n", error));
        }
    }
    Ok(out)
}
