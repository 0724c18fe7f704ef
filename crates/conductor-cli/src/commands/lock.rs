//! Workspace lock commands.

use anyhow::Result;
use conductor_lock::WorkspaceLock;

use super::timestamp;

pub fn status(lock: &WorkspaceLock) -> Result<String> {
    let status = lock.status()?;
    let mut out = format!("Lock file: {}\n", lock.path().display());
    if !status.locked {
        out.push_str("Status:    free\n");
        return Ok(out);
    }

    out.push_str("Status:    held\n");
    match &status.holder {
        Some(holder) => {
            out.push_str(&format!("Owner:     {}\n", holder.owner));
            out.push_str(&format!("PID:       {}\n", holder.pid));
            out.push_str(&format!("Since:     {}\n", timestamp(Some(holder.acquired_at))));
        }
        None => out.push_str("Owner:     unknown\n"),
    }
    Ok(out)
}

pub fn release(lock: &WorkspaceLock, label: &str) -> Result<String> {
    if lock.force_release(label)? {
        Ok(format!("Removed lock file {}\n", lock.path().display()))
    } else {
        Ok("No lock file present\n".to_string())
    }
}
