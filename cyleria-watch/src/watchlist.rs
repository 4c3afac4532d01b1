//! Static watch-list file: one nickname per line, `#` starts a comment.

use std::path::Path;

use tracing::debug;

use crate::Result;

/// Parse watch-list text. Blank lines and comments are dropped.
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Read the watch-list at `path`. A missing file is an empty list.
pub async fn read_watchlist(path: &Path) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(parse_watchlist(&raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no watch-list file");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}
