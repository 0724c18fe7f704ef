//! Integration configuration commands.

use anyhow::{Result, bail};
use conductor_db::Ledger;

pub async fn get(ledger: &Ledger, service: &str, key: &str) -> Result<String> {
    match ledger.config.get(service, key).await? {
        Some(value) => Ok(format!("{}\n", value)),
        None => bail!("no configuration entry {}.{}", service, key),
    }
}

pub async fn set(
    ledger: &Ledger,
    service: &str,
    key: &str,
    value: &str,
    secret: bool,
    description: Option<&str>,
) -> Result<String> {
    ledger.config.set(service, key, value, secret, description).await?;
    Ok(format!("Updated {}.{}\n", service, key))
}

pub async fn list(ledger: &Ledger, service: &str) -> Result<String> {
    let entries = ledger.config.all_non_secret(service).await?;
    if entries.is_empty() {
        return Ok(format!("No entries for {}\n", service));
    }
    let width = entries.keys().map(String::len).max().unwrap_or(0);
    Ok(entries
        .iter()
        .map(|(key, value)| format!("{:width$}  {}\n", key, value, width = width))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_list() {
        let ledger = Ledger::in_memory();
        set(&ledger, "build-system", "sync_project_ref", "erp/sync", false, None)
            .await
            .unwrap();
        set(&ledger, "build-system", "token", "glpat-x", true, Some("API token"))
            .await
            .unwrap();

        assert_eq!(get(&ledger, "build-system", "sync_project_ref").await.unwrap(), "erp/sync\n");
        assert_eq!(get(&ledger, "build-system", "token").await.unwrap(), "glpat-x\n");

        let listing = list(&ledger, "build-system").await.unwrap();
        assert_eq!(listing, "sync_project_ref  erp/sync\n");
    }

    #[tokio::test]
    async fn test_get_missing_entry_fails() {
        let ledger = Ledger::in_memory();
        let err = get(&ledger, "build-system", "absent").await.unwrap_err();
        assert!(err.to_string().contains("build-system.absent"));
        assert_eq!(list(&ledger, "build-system").await.unwrap(), "No entries for build-system\n");
    }
}
