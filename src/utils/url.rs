//! Endpoint URL helpers for the model provider.

use reqwest::Url;

/// Joins `endpoint` onto `base_url` with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use astrid::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Checks that `base_url` is an absolute http(s) URL and returns it without
/// trailing slashes.
///
/// # Examples
///
/// ```
/// use astrid::utils::url::validate_base_url;
///
/// assert_eq!(
///     validate_base_url("http://localhost:11434/v1/").as_deref(),
///     Ok("http://localhost:11434/v1")
/// );
/// assert!(validate_base_url("localhost:11434").is_err());
/// ```
pub fn validate_base_url(base_url: &str) -> Result<String, String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let parsed =
        Url::parse(trimmed).map_err(|err| format!("invalid base URL '{base_url}': {err}"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        "http" | "https" => Err(format!("invalid base URL '{base_url}': missing host")),
        scheme => Err(format!(
            "invalid base URL '{base_url}': unsupported scheme '{scheme}'"
        )),
    }
}
