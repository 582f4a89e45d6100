pub mod state;

use url::Url;

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Human-readable cache size, rounded to whole megabytes.
pub fn format_size(bytes: u64) -> String {
    format!("~{} MB", (bytes as f64 / MEGABYTE).round() as u64)
}

/// Whether the runner talks to a GitHub Enterprise Server instance.
///
/// github.com, GHE.com data-residency hosts and `.localhost` development
/// hosts are not GHES. An unparseable URL is treated as not GHES.
pub fn is_ghes(server_url: Option<&str>) -> bool {
    let server_url = server_url
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("https://github.com");
    let Ok(url) = Url::parse(server_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    host != "github.com" && !host.ends_with(".ghe.com") && !host.ends_with(".localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "~0 MB");
        assert_eq!(format_size(5 * 1024 * 1024), "~5 MB");
        assert_eq!(format_size(1536 * 1024), "~2 MB");
    }

    #[test]
    fn test_is_ghes() {
        assert!(!is_ghes(None));
        assert!(!is_ghes(Some("")));
        assert!(!is_ghes(Some("https://github.com")));
        assert!(!is_ghes(Some("https://GitHub.com/")));
        assert!(!is_ghes(Some("https://acme.ghe.com")));
        assert!(!is_ghes(Some("http://github.localhost")));
        assert!(is_ghes(Some("https://github.acme-corp.internal")));
    }
}
