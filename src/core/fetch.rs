use crate::core::transfer::TransferTracker;
use crate::utils::error::{Result, SyncError};
use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Streams `url` into `dir` and returns the local path. The file name comes
/// from an explicit override, the Content-Disposition header, or the last
/// URL path segment, in that order.
pub async fn download_to(
    client: &Client,
    url: &Url,
    dir: &Path,
    file_name: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;

    let response = client.get(url.clone()).send().await?.error_for_status()?;

    let name = file_name
        .map(str::to_owned)
        .or_else(|| disposition_file_name(&response))
        .or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.last())
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "download".to_string());

    let total = response.content_length().unwrap_or(0);
    let tracker = TransferTracker::new(name.clone(), total);

    let destination = dir.join(&name);
    let partial = partial_path(&destination);
    let write = async {
        let mut file = fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            tracker.add(chunk.len() as u64);
        }
        file.flush().await?;
        Ok::<_, SyncError>(())
    };
    if let Err(err) = write.await {
        discard_partial(&partial).await;
        return Err(err);
    }
    fs::rename(&partial, &destination).await?;

    tracing::info!(
        path = %destination.display(),
        bytes = tracker.transferred(),
        "downloaded source file"
    );
    Ok(destination)
}

fn disposition_file_name(response: &reqwest::Response) -> Option<String> {
    let header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    let pattern = Regex::new(r#"filename="?([^";]+)"?"#).ok()?;
    let captures = pattern.captures(header)?;
    Some(captures.get(1)?.as_str().trim().to_string())
}

/// Removes a stale `.part` file after a failed transfer so the cache
/// directory does not accumulate half-written downloads.
pub(crate) async fn discard_partial(partial: &Path) {
    if let Err(err) = fs::remove_file(partial).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %partial.display(), error = %err, "failed to remove partial file");
        }
    }
}

/// Downloads land next to their destination and are renamed into place, so
/// readers never observe a half-written file.
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    destination.with_file_name(name)
}
