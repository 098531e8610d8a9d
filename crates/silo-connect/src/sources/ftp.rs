//! FTP source connector
//!
//! Lists the remote path and downloads every file under the lake root.
//! Items come back already materialized (`lake_path` set), so the staging
//! writer passes them through untouched.

use crate::config::{ConfigLoader, ConnectorConfig};
use crate::contract::{Connector, IngestedItem, IngestionResult};
use crate::error::{ConnectError, Result};
use crate::registry::ConnectorContext;
use async_trait::async_trait;
use futures::io::AsyncReadExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use suppaftp::AsyncFtpStream;
use tracing::{debug, info};

const DEFAULT_PORT: i64 = 21;

/// Register under the `ftp` protocol
pub fn create(
    config: &ConnectorConfig,
    _context: &ConnectorContext,
) -> Result<Box<dyn Connector>> {
    let merged = ConfigLoader::new()
        .default_value("port", json!(DEFAULT_PORT))
        .default_value("remote_base_path", json!("/"))
        .default_value("lake_path", json!("./lake"))
        .env_prefix("FTP")
        .explicit(config)
        .required(&["host", "username", "password"])
        .load()?;

    Ok(Box::new(FtpConnector {
        host: merged.require_str("host")?,
        port: merged.i64_or("port", DEFAULT_PORT) as u16,
        username: merged.require_str("username")?,
        password: merged.require_str("password")?,
        remote_base_path: merged.str_or("remote_base_path", "/"),
        lake_path: PathBuf::from(merged.str_or("lake_path", "./lake")),
        redacted: merged.redacted(),
        stream: None,
    }))
}

pub struct FtpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_base_path: String,
    lake_path: PathBuf,
    redacted: ConnectorConfig,
    stream: Option<AsyncFtpStream>,
}

impl FtpConnector {
    fn resolve_remote_path<'a>(&'a self, query: &'a str) -> &'a str {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            &self.remote_base_path
        } else {
            trimmed
        }
    }
}

#[async_trait]
impl Connector for FtpConnector {
    async fn connect(&mut self) -> Result<()> {
        info!(config = %self.redacted, "Connecting FTP connector");

        let address = format!("{}:{}", self.host, self.port);
        let mut stream = AsyncFtpStream::connect(address.as_str()).await.map_err(|error| {
            ConnectError::connection(format!("FTP server unreachable at {address}: {error}"))
        })?;

        stream
            .login(&self.username, &self.password)
            .await
            .map_err(|error| {
                ConnectError::connection(format!("FTP login failed: {error}"))
            })?;

        self.stream = Some(stream);
        debug!("FTP connector connected");
        Ok(())
    }

    async fn fetch_data(&mut self, query: &str) -> Result<IngestionResult> {
        let remote_path = self.resolve_remote_path(query).to_string();

        let stream = self.stream.as_mut().ok_or_else(|| {
            ConnectError::connection("FTP connector is not connected. Call connect() first")
        })?;

        std::fs::create_dir_all(&self.lake_path)?;

        debug!(remote_path = %remote_path, "FTP listing remote path");
        let file_names = stream.nlst(Some(remote_path.as_str())).await?;

        let mut items = Vec::with_capacity(file_names.len());
        for file_name in &file_names {
            let base_name = Path::new(file_name)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.clone());
            let local_path = self.lake_path.join(&base_name);

            debug!(remote = %file_name, local = %local_path.display(), "FTP downloading file");
            let buffer = stream
                .retr(file_name.as_str(), |mut data_stream| {
                    Box::pin(async move {
                        let mut buf = Vec::new();
                        match data_stream.read_to_end(&mut buf).await {
                            Ok(_) => Ok((std::io::Cursor::new(buf), data_stream)),
                            Err(error) => Err(suppaftp::FtpError::ConnectionError(error)),
                        }
                    })
                })
                .await?;
            std::fs::write(&local_path, buffer.into_inner())?;

            let size_bytes = std::fs::metadata(&local_path)?.len();
            items.push(IngestedItem::materialized(
                file_name.clone(),
                local_path.to_string_lossy().into_owned(),
                size_bytes,
            ));
        }

        let downloaded = items.len();
        Ok(IngestionResult::success("ftp", items)
            .with_metadata("remote_path", json!(remote_path))
            .with_metadata("downloaded_files", json!(downloaded)))
    }

    async fn close(&mut self) {
        debug!("Closing FTP connector");
        if let Some(mut stream) = self.stream.take() {
            // Best-effort goodbye; the socket closes on drop either way
            let _ = stream.quit().await;
        }
    }
}
