use helmsman_core::error::HelmsmanResult;
use std::path::Path;

/// Read the node id persisted from a previous registration. Absent or
/// empty files read as no identity.
pub async fn read_node_id(path: &str) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let id = content.lines().next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Persist the manager-assigned node id, one line, UTF-8.
pub async fn write_node_id(path: &str, node_id: &str) -> HelmsmanResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, format!("{}\n", node_id)).await?;
    Ok(())
}
