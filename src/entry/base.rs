//! Base path derivation and resource URL resolution.

use url::{ParseError, Url};

/// Whether an entry string should be fetched rather than treated as markup.
pub fn is_url_entry(entry: &str) -> bool {
    let entry = entry.trim_start();
    starts_with_ignore_case(entry, "http://") || starts_with_ignore_case(entry, "https://")
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Directory of an entry URL, e.g. `https://cdn.example.com/app/index.html`
/// becomes `https://cdn.example.com/app/`.
pub fn base_path_for_url(entry: &Url) -> Url {
    entry.join(".").unwrap_or_else(|_| entry.clone())
}

/// Base path used for raw markup: the host origin with a trailing slash.
pub fn base_path_for_origin(origin: &Url) -> Url {
    origin.join("/").unwrap_or_else(|_| origin.clone())
}

/// Resolve a resource reference. References with a scheme pass through,
/// everything else is joined onto `base`.
pub fn resolve(reference: &str, base: &Url) -> Result<Url, ParseError> {
    let reference = reference.trim();
    match Url::parse(reference) {
        Ok(absolute) => Ok(absolute),
        Err(ParseError::RelativeUrlWithoutBase) => base.join(reference),
        Err(e) => Err(e),
    }
}
