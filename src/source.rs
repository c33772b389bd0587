use tracing::debug;

use crate::error::{Error, Result};
use crate::ftp;
use crate::types::KeySource;

/// Reads key material from a local path or downloads it from an http, https
/// or ftp URL.
///
/// `weak_ssl` disables certificate verification for https downloads.
pub async fn fetch(source: &KeySource, weak_ssl: bool) -> Result<Vec<u8>> {
    let fetch_error = |reason: String| Error::Fetch {
        location: source.to_string(),
        reason,
    };

    match source {
        KeySource::Path(path) => {
            debug!(path = %path.display(), "reading key material");
            tokio::fs::read(path)
                .await
                .map_err(|err| fetch_error(err.to_string()))
        }
        KeySource::Url(url) if matches!(url.scheme(), "http" | "https") => {
            debug!(%url, weak_ssl, "downloading key material");
            let client = reqwest::Client::builder()
                .danger_accept_invalid_certs(weak_ssl && url.scheme() == "https")
                .build()
                .map_err(|err| fetch_error(err.to_string()))?;

            let response = client
                .get(url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| fetch_error(err.to_string()))?;

            let body = response
                .bytes()
                .await
                .map_err(|err| fetch_error(err.to_string()))?;

            Ok(body.to_vec())
        }
        KeySource::Url(url) if url.scheme() == "ftp" => {
            debug!(%url, "downloading key material");
            ftp::retrieve(url)
                .await
                .map_err(|err| fetch_error(err.to_string()))
        }
        KeySource::Url(url) => Err(fetch_error(format!(
            "fetching over {} is not supported",
            url.scheme()
        ))),
    }
}
