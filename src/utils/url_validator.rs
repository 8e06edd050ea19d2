// SPDX-License-Identifier: GPL-3.0-only
use anyhow::{Context, Result};
use url::Url;

/// Maximum allowed URL length
const MAX_URL_LENGTH: usize = 2048;

/// Validate a mirror source URL
///
/// Checks:
/// - Only allows http/https schemes
/// - Requires a host
/// - Rejects query strings and fragments, which break `source/relative-path` joins
/// - Validates URL length
pub fn validate_source_url(url_str: &str) -> Result<Url> {
    if url_str.len() > MAX_URL_LENGTH {
        return Err(anyhow::anyhow!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }

    let url = Url::parse(url_str)
        .with_context(|| format!("Invalid source URL: {}", url_str))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(anyhow::anyhow!(
                "Invalid URL scheme: {} (only http and https are allowed)",
                scheme
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow::anyhow!("URL must have a host"));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(anyhow::anyhow!("Source URL must not carry a query or fragment"));
    }

    Ok(url)
}

/// `root/relative-path`, tolerating a trailing slash on the root
pub fn join_url(root: &str, relative: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), relative.trim_start_matches('/'))
}
