use crate::map::CompositesMap;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use url::Url;

const READ_CHUNK_SIZE: usize = 8192;

/// Where a composites map is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapSource {
    File(PathBuf),
    Http(Url),
}

impl MapSource {
    /// Accepts `http(s)://` and `file://` URLs; anything else is a local path.
    pub fn parse(location: &str) -> Result<Self> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(MapSource::Http(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(MapSource::File)
                .map_err(|()| anyhow::anyhow!("Invalid file URL: {location}")),
            Ok(url) if url.scheme().len() > 1 => {
                Err(anyhow::anyhow!("Unsupported map scheme: {}", url.scheme()))
            }
            // No scheme, or a Windows drive letter
            _ => Ok(MapSource::File(PathBuf::from(location))),
        }
    }

    pub fn location(&self) -> String {
        match self {
            MapSource::File(path) => path.display().to_string(),
            MapSource::Http(url) => url.to_string(),
        }
    }

    /// Streams the map into `map` chunk by chunk.
    ///
    /// On a transfer error the partial buffer is discarded and the error
    /// returned; nothing is parsed.
    pub async fn fetch_into(&self, map: &mut CompositesMap) -> Result<()> {
        let result = match self {
            MapSource::File(path) => Self::read_file(path, map).await,
            MapSource::Http(url) => Self::read_http(url, map).await,
        };

        if result.is_err() {
            map.discard();
        }
        result
    }

    async fn read_file(path: &Path, map: &mut CompositesMap) -> Result<()> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open composites map: {}", path.display()))?;
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = file
                .read(&mut chunk)
                .await
                .with_context(|| format!("Failed to read composites map: {}", path.display()))?;
            if n == 0 {
                break;
            }
            map.read_chunk(&chunk[..n]);
        }

        Ok(())
    }

    async fn read_http(url: &Url, map: &mut CompositesMap) -> Result<()> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("foff-composites/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut response = client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch composites map: {url}"))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Transfer of composites map failed: {url}"))?
        {
            log::debug!("received {} bytes of composites map {url}", chunk.len());
            map.read_chunk(&chunk);
        }

        Ok(())
    }
}
