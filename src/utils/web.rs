use url::Url;

use crate::types::error::AppError;

// Canonical string form used for deduplication: fragment stripped, empty
// query dropped. The url crate already lowercases scheme/host and removes
// default ports.
pub fn canonicalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    url.to_string()
}

// host, or host:port when the port is non-default for the scheme
pub fn host_key(url: &Url) -> Result<String, AppError> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Generic(format!("no host in uri: {url}")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
