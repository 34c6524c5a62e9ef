use url::Url;

/// Normalizes an address into the identity key used to match records across stores
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Downgrade `https://` to `http://` so both spellings share a key
/// 3. Lowercase the host and drop a `www.` prefix
/// 4. Keep path, query and fragment as given
/// 5. Remove trailing slashes
///
/// Inputs that do not parse as absolute URLs (bare domains, free text) are only
/// trimmed and stripped of trailing slashes, so they still produce a stable key.
/// An empty input yields an empty key.
///
/// # Examples
///
/// ```
/// use profile_enrich::url::normalize_identity;
///
/// assert_eq!(normalize_identity("https://WWW.Example.com/shop/"), "http://example.com/shop");
/// assert_eq!(normalize_identity("http://a.biz"), "http://a.biz");
/// ```
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let downgraded = match trimmed.get(..8) {
        Some(prefix) if prefix.eq_ignore_ascii_case("https://") => {
            format!("http://{}", &trimmed[8..])
        }
        _ => trimmed.to_string(),
    };

    let url = match Url::parse(&downgraded) {
        Ok(url) if url.host_str().is_some() => url,
        _ => return downgraded.trim_end_matches('/').to_string(),
    };

    let mut key = format!("{}://", url.scheme());

    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        key.push_str(host.strip_prefix("www.").unwrap_or(&host));
    }

    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }

    key.push_str(url.path());

    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    if let Some(fragment) = url.fragment() {
        key.push('#');
        key.push_str(fragment);
    }

    key.trim_end_matches('/').to_string()
}
