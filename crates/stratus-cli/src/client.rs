pub fn auth(builder: reqwest::RequestBuilder, token: Option<&String>) -> reqwest::RequestBuilder {
    match token {
        Some(t) => builder.bearer_auth(t),
        None => builder,
    }
}

/// Build a console API URL from the base URL.
pub fn api_url(console_url: &str, path: &str) -> String {
    format!("{}/api{}", console_url.trim_end_matches('/'), path)
}
