//! Links and pattern matches in message bodies

use crate::error::Result;
use crate::message::Payload;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href=['"]?([^'" >]+)"#).expect("href pattern is valid")
});

/// Every `href` target in `body`, in order of appearance.
#[must_use]
pub fn extract_links(body: &str) -> Vec<String> {
    HREF.captures_iter(body)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Every match of `pattern` in `body`.
///
/// When the pattern has capture groups the first group of each match
/// is returned, otherwise the whole match.
///
/// # Errors
///
/// Returns [`crate::Error::Pattern`] if `pattern` is not a valid regex.
pub fn find_matches(body: &str, pattern: &str) -> Result<Vec<String>> {
    let re = Regex::new(pattern)?;
    let group = usize::from(re.captures_len() > 1);

    Ok(re
        .captures_iter(body)
        .filter_map(|caps| caps.get(group).map(|m| m.as_str().to_string()))
        .collect())
}

/// Fetch `url` over HTTP(S).
///
/// A response whose `Content-Type` declares a charset is decoded to
/// text; anything else is returned as raw bytes.
///
/// # Errors
///
/// Returns [`crate::Error::Http`] if the request fails or the server
/// answers with a 4xx/5xx status.
pub async fn open_url(client: &reqwest::Client, url: &str) -> Result<Payload> {
    debug!("Opening link {}", url);
    let response = client.get(url).send().await?.error_for_status()?;

    let declares_charset = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("charset="));

    if declares_charset {
        Ok(Payload::Text(response.text().await?))
    } else {
        Ok(Payload::Raw(response.bytes().await?.to_vec()))
    }
}
