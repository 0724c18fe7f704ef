//! External file commands.

use anyhow::Result;
use conductor_db::Ledger;

use super::{or_dash, timestamp};

pub async fn pending(ledger: &Ledger) -> Result<String> {
    let files = ledger.files.pending().await?;
    if files.is_empty() {
        return Ok("No pending files\n".to_string());
    }

    let mut out = format!(
        "{:<6} {:<8} {:<10} {:<6} {:<19} {}\n",
        "ID", "ISSUE", "ATTACHMENT", "TYPE", "CREATED", "FILENAME"
    );
    for f in &files {
        out.push_str(&format!(
            "{:<6} {:<8} {:<10} {:<6} {:<19} {}\n",
            f.id,
            f.issue_id,
            f.attachment_id,
            f.file_type,
            timestamp(Some(f.created_at)),
            f.filename
        ));
        if let Some(size) = f.file_size_bytes {
            out.push_str(&format!("       size: {} bytes, path: {}\n", size, or_dash(f.file_path.as_deref())));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::FileStatus;
    use conductor_db::{FileUpdate, NewExternalFile};

    fn new_file(attachment_id: i64, filename: &str) -> NewExternalFile {
        NewExternalFile {
            issue_id: 42,
            attachment_id,
            filename: filename.to_string(),
            file_type: "epf".to_string(),
            file_size_bytes: Some(2048),
            file_path: Some("/data/inbox".to_string()),
            version: None,
        }
    }

    #[tokio::test]
    async fn test_pending_skips_processed_files() {
        let ledger = Ledger::in_memory();
        assert_eq!(pending(&ledger).await.unwrap(), "No pending files\n");

        let done = ledger.files.create(new_file(1, "done.epf")).await.unwrap();
        ledger.files.create(new_file(2, "waiting.epf")).await.unwrap();
        ledger
            .files
            .update_status(done.id, FileStatus::Completed, FileUpdate::default())
            .await
            .unwrap();

        let out = pending(&ledger).await.unwrap();
        assert!(out.contains("waiting.epf"));
        assert!(!out.contains("done.epf"));
        assert!(out.contains("size: 2048 bytes, path: /data/inbox"));
    }
}
