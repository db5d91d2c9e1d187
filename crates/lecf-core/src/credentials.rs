//! DNS plugin credentials file
//!
//! The CA client's Cloudflare plugin reads the API token from a small
//! key-value file. It is written once at startup, owner read/write only.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Render the file contents
pub fn render_credentials(api_token: &str, email: Option<&str>) -> String {
    let mut contents = format!("dns_cloudflare_api_token = {}\n", api_token);
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        contents.push_str(&format!("dns_cloudflare_email = {}\n", email));
    }
    contents
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write the credentials file at `path`
///
/// Parent directories are created as needed. Contents go to a sibling
/// temporary file which is restricted to mode 0600 (Unix) and then renamed
/// over `path`.
pub async fn write_credentials_file(path: &Path, api_token: &str, email: Option<&str>) -> Result<()> {
    if api_token.trim().is_empty() {
        return Err(Error::config("Cloudflare API token is empty"));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::config(format!(
                "Failed to create credentials directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp = temp_path(path);
    {
        let mut file = fs::File::create(&temp).await.map_err(|e| {
            Error::config(format!(
                "Failed to create temp file {}: {}",
                temp.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    Error::config(format!(
                        "Failed to restrict permissions on {}: {}",
                        temp.display(),
                        e
                    ))
                })?;
        }

        file.write_all(render_credentials(api_token, email).as_bytes())
            .await?;
        file.flush().await?;
    }

    fs::rename(&temp, path).await.map_err(|e| {
        Error::config(format!(
            "Failed to rename {} to {}: {}",
            temp.display(),
            path.display(),
            e
        ))
    })?;

    info!(path = %path.display(), "Cloudflare credentials ready");
    Ok(())
}
