//! URL handling module for Profile-Enrich
//!
//! Identity keys are derived from record addresses here, and proxy endpoints are
//! turned into the URLs the browser and probe client understand.

mod normalize;

pub use normalize::normalize_identity;

/// Builds the proxy URL for a pooled endpoint
///
/// Endpoints that already carry a scheme are returned unchanged.
///
/// # Examples
///
/// ```
/// use profile_enrich::url::endpoint_url;
///
/// assert_eq!(endpoint_url("socks5", "10.0.0.1:1080"), "socks5://10.0.0.1:1080");
/// assert_eq!(endpoint_url("socks5", "http://10.0.0.1:3128"), "http://10.0.0.1:3128");
/// ```
pub fn endpoint_url(scheme: &str, endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{}://{}", scheme, endpoint)
    }
}
