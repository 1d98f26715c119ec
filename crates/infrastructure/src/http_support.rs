use dashprune_core::{AppError, AppResult};
use url::Url;

/// Parses a service base URL, rejecting values that cannot carry a path.
pub(crate) fn parse_base_url(name: &str, value: &str) -> AppResult<Url> {
    let url = Url::parse(value.trim_end_matches('/'))
        .map_err(|error| AppError::Validation(format!("invalid {name} URL '{value}': {error}")))?;

    if url.cannot_be_a_base() {
        return Err(AppError::Validation(format!(
            "{name} URL '{value}' cannot be used as a base URL"
        )));
    }

    Ok(url)
}

/// Appends percent-encoded path segments to a base URL.
pub(crate) fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> AppResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| AppError::Internal(format!("URL '{base}' cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Reads a response body for error messages without failing the caller.
pub(crate) async fn body_for_error(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|error| format!("<response body unavailable: {error}>"))
}
