//! `file:` URL fetcher

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tracing::debug;

use crate::error::TransportError;
use crate::fetcher::{FetchResponse, Fetcher};
use crate::job::{ResponseMeta, TransportRequest};

/// Reads local files, guessing the mimetype from the extension
#[derive(Debug, Default, Clone)]
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError> {
        let path = request
            .url
            .to_file_path()
            .map_err(|_| TransportError::NotFound(request.url.to_string()))?;

        debug!("Reading local file {}", path.display());
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mimetype = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string());
        let meta = ResponseMeta {
            mimetype: mimetype.clone(),
            ..Default::default()
        };

        let chunks: Vec<Result<Bytes, TransportError>> = contents
            .chunks(CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let body = stream::iter(chunks).boxed();

        Ok(FetchResponse {
            mimetype,
            error_page: false,
            meta,
            body,
        })
    }
}

const CHUNK_SIZE: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use url::Url;

    #[tokio::test]
    async fn test_reads_file_with_guessed_mimetype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.css");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"body{margin:0}")
            .unwrap();

        let request = TransportRequest::new(Url::from_file_path(&path).unwrap());
        let response = FileFetcher.open(&request).await.unwrap();
        assert_eq!(response.mimetype.as_deref(), Some("text/css"));

        let body: Vec<u8> = response
            .body
            .map(|c| c.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(body, b"body{margin:0}");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("nope.js")).unwrap();
        let result = FileFetcher.open(&TransportRequest::new(url)).await;
        assert!(matches!(result, Err(TransportError::NotFound(_))));
    }
}
