use std::{
    fs, io,
    path::{Path, PathBuf},
};

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::locator::ToolchainPaths;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download failed: {0}")]
    Download(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        InstallError::Io {
            context: context.into(),
            source,
        }
    }
}

pub fn cached_archive_path(paths: &ToolchainPaths, url: &str) -> PathBuf {
    paths.download_dir().join(cache_file_name(url))
}

fn cache_file_name(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or("artifact.zip");
    let name = name.split('?').next().unwrap_or(name);
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("{}-{}", &digest[..12], name)
}

fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn download_archive(url: &str, dest: &Path) -> Result<(), InstallError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| InstallError::io("failed to create download dir", e))?;
    }

    let client = Client::builder()
        .user_agent("geochange")
        .build()
        .map_err(|e| InstallError::Download(format!("failed to build http client: {e}")))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::Download(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(InstallError::Download(format!(
            "{url} returned status {}",
            resp.status()
        )));
    }

    let tmp = dest.with_extension(format!("tmp-{}", Uuid::new_v4()));
    write_stream_to(resp.bytes_stream(), &tmp, dest).await
}

async fn write_stream_to<S, B, E>(stream: S, tmp: &Path, dest: &Path) -> Result<(), InstallError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let result = fill_and_rename(stream, tmp, dest).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}

async fn fill_and_rename<S, B, E>(stream: S, tmp: &Path, dest: &Path) -> Result<(), InstallError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| InstallError::io("failed to create temp file", e))?;

    tokio::pin!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| InstallError::Download(format!("read failed: {e}")))?;
        file.write_all(chunk.as_ref())
            .await
            .map_err(|e| InstallError::io("failed to write temp file", e))?;
    }
    file.flush()
        .await
        .map_err(|e| InstallError::io("failed to flush temp file", e))?;
    drop(file);

    tokio::fs::rename(tmp, dest)
        .await
        .map_err(|e| InstallError::io("failed to finalize download", e))
}

pub async fn extract_zip(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    info!(
        "Extracting archive {} into {}",
        archive.display(),
        dest.display()
    );
    tokio::task::spawn_blocking(move || -> Result<(), InstallError> {
        fs::create_dir_all(&dest).map_err(|e| InstallError::io("failed to create staging dir", e))?;
        let file = fs::File::open(&archive)
            .map_err(|e| InstallError::io(format!("failed to open {}", archive.display()), e))?;
        let mut zip =
            zip::ZipArchive::new(file).map_err(|e| InstallError::Extract(e.to_string()))?;
        zip.extract(&dest)
            .map_err(|e| InstallError::Extract(e.to_string()))
    })
    .await
    .map_err(|e| InstallError::Extract(format!("extract task failed: {e}")))?
}

pub fn finalize_cmdline_tools(staging: &Path, target: &Path) -> Result<(), InstallError> {
    let entries =
        fs::read_dir(staging).map_err(|e| InstallError::io("failed to read staging dir", e))?;
    let mut root_dir: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry.map_err(|e| InstallError::io("failed to read dir entry", e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| InstallError::io("failed to read dir entry type", e))?;
        if file_type.is_dir() && root_dir.is_none() {
            root_dir = Some(entry.path());
        }
    }
    let root = root_dir
        .ok_or_else(|| InstallError::Extract("archive has no top-level directory".into()))?;

    swap_into_place(&root, target)?;
    fs::remove_dir_all(staging).map_err(|e| InstallError::io("failed to clean staging dir", e))?;
    Ok(())
}

/// Renames `root` to `target`. An existing `target` is moved aside first and put back if the
/// rename fails.
fn swap_into_place(root: &Path, target: &Path) -> Result<(), InstallError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| InstallError::io("failed to create sdk dir", e))?;
    }

    let previous = if target.exists() {
        let aside = target.with_extension(format!("old-{}", Uuid::new_v4()));
        fs::rename(target, &aside)
            .map_err(|e| InstallError::io("failed to move previous install aside", e))?;
        Some(aside)
    } else {
        None
    };

    if let Err(err) = fs::rename(root, target) {
        if let Some(aside) = previous.as_ref() {
            if let Err(restore) = fs::rename(aside, target) {
                warn!("failed to restore previous command-line tools: {restore}");
            }
        }
        return Err(InstallError::io("failed to finalize install", err));
    }

    if let Some(aside) = previous {
        if let Err(err) = fs::remove_dir_all(&aside) {
            warn!("failed to remove {}: {err}", aside.display());
        }
    }
    Ok(())
}

pub async fn install_cmdline_tools<F>(
    paths: &ToolchainPaths,
    url: &str,
    log: F,
) -> Result<PathBuf, InstallError>
where
    F: Fn(String) + Send + Sync,
{
    let archive = cached_archive_path(paths, url);
    if archive.is_file() {
        log(format!("Using cached {}", archive.display()));
    } else {
        log(format!("Downloading {url}"));
        download_archive(url, &archive).await?;
    }
    match file_digest(&archive) {
        Ok(digest) => log(format!("sha256 {digest}")),
        Err(err) => warn!("failed to hash {}: {err}", archive.display()),
    }

    let staging = paths
        .sdk_root()
        .join(format!(".staging-{}", Uuid::new_v4()));
    if let Err(err) = extract_zip(&archive, &staging).await {
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_file(&archive);
        return Err(err);
    }

    let target = paths.cmdline_tools_dir();
    if let Err(err) = finalize_cmdline_tools(&staging, &target) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }
    log(format!("Command-line tools installed at {}", target.display()));
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::HostOs;
    use std::io::Write;

    fn write_tools_zip(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().unix_permissions(0o755);
        zip.add_directory("cmdline-tools/", options).unwrap();
        zip.add_directory("cmdline-tools/bin/", options).unwrap();
        zip.start_file("cmdline-tools/bin/sdkmanager", options)
            .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("cmdline-tools/bin/avdmanager", options)
            .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn cache_name_keeps_file_name() {
        let name = cache_file_name("https://dl.google.com/a/commandlinetools-linux-1_latest.zip?x=1");
        assert!(name.ends_with("-commandlinetools-linux-1_latest.zip"));
        assert_eq!(name.len(), 13 + "commandlinetools-linux-1_latest.zip".len());
    }

    #[test]
    fn file_digest_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tools.tmp-1");
        let dest = dir.path().join("tools.zip");
        let chunks: Vec<Result<&[u8], &str>> = vec![Ok(&b"PK"[..]), Err("connection reset")];

        let err = write_stream_to(futures_util::stream::iter(chunks), &tmp, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Download(_)));
        assert!(!tmp.exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tools.tmp-2");
        let dest = dir.path().join("occupied");
        fs::create_dir_all(dest.join("child")).unwrap();
        let chunks: Vec<Result<&[u8], &str>> = vec![Ok(&b"PK"[..]), Ok(&b"\x03\x04"[..])];

        let err = write_stream_to(futures_util::stream::iter(chunks), &tmp, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Io { .. }));
        assert!(!tmp.exists());
        assert!(dest.join("child").is_dir());
    }

    #[tokio::test]
    async fn complete_stream_lands_at_dest() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tools.tmp-3");
        let dest = dir.path().join("tools.zip");
        let chunks: Vec<Result<&[u8], &str>> = vec![Ok(&b"ab"[..]), Ok(&b"c"[..])];

        write_stream_to(futures_util::stream::iter(chunks), &tmp, &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"abc");
        assert!(!tmp.exists());
    }

    #[test]
    fn failed_swap_restores_previous_install() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sdk/cmdline-tools/latest");
        fs::create_dir_all(target.join("bin")).unwrap();
        fs::write(target.join("bin/sdkmanager"), b"old").unwrap();
        let vanished = dir.path().join("staging/cmdline-tools");

        let err = swap_into_place(&vanished, &target).unwrap_err();

        assert!(matches!(err, InstallError::Io { .. }));
        assert_eq!(fs::read(target.join("bin/sdkmanager")).unwrap(), b"old");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("latest")]);
    }

    #[test]
    fn finalize_replaces_previous_install() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(staging.join("cmdline-tools/bin")).unwrap();
        fs::write(staging.join("cmdline-tools/bin/sdkmanager"), b"new").unwrap();

        let target = dir.path().join("sdk/cmdline-tools/latest");
        fs::create_dir_all(target.join("bin")).unwrap();
        fs::write(target.join("bin/sdkmanager"), b"old").unwrap();
        fs::write(target.join("stale.txt"), b"x").unwrap();

        finalize_cmdline_tools(&staging, &target).unwrap();

        assert_eq!(fs::read(target.join("bin/sdkmanager")).unwrap(), b"new");
        assert!(!target.join("stale.txt").exists());
        assert!(!staging.exists());
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("latest")]);
    }

    #[test]
    fn finalize_rejects_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let target = dir.path().join("latest");
        let err = finalize_cmdline_tools(&staging, &target).unwrap_err();
        assert!(matches!(err, InstallError::Extract(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn install_uses_cached_archive() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ToolchainPaths::new(dir.path()).with_host(HostOs::Linux);
        let url = "https://example.invalid/commandlinetools-linux-11076708_latest.zip";
        write_tools_zip(&cached_archive_path(&paths, url));

        let lines = std::sync::Mutex::new(Vec::new());
        let target = install_cmdline_tools(&paths, url, |line| lines.lock().unwrap().push(line))
            .await
            .unwrap();

        assert_eq!(target, paths.cmdline_tools_dir());
        assert!(paths.cmdline_tools_installed());
        let lines = lines.into_inner().unwrap();
        assert!(lines[0].starts_with("Using cached"));
        assert!(lines.iter().any(|line| line.starts_with("sha256 ")));
    }

    #[tokio::test]
    async fn corrupt_cache_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ToolchainPaths::new(dir.path()).with_host(HostOs::Linux);
        let url = "https://example.invalid/tools.zip";
        let archive = cached_archive_path(&paths, url);
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"not a zip").unwrap();

        let err = install_cmdline_tools(&paths, url, |_| {}).await.unwrap_err();
        assert!(matches!(err, InstallError::Extract(_)));
        assert!(!archive.exists());
        assert!(!paths.cmdline_tools_installed());
    }
}
