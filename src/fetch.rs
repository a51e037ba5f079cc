//! Manifest bundle retrieval
//!
//! The master bundle unpacks into the work directory; the optional user
//! bundle unpacks into its `data_bags` subdirectory, alongside the groups.

use anyhow::{Context, Result, bail};
use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Maximum size of a downloaded bundle (64 MB)
const MAX_BUNDLE_SIZE: u64 = 64 * 1024 * 1024;

/// Download and unpack the configured bundles, returning the manifest root
pub fn fetch(config: &Config) -> Result<PathBuf> {
    let Some(master_url) = config.master_url.as_deref() else {
        bail!("No master URL configured (set master_url, MASTER_URL or --master-url)");
    };

    let master = download(master_url)?;
    let user = config.user_url.as_deref().map(download).transpose()?;

    install(&config.work_dir, &master, user.as_deref())?;
    Ok(config.work_dir.clone())
}

/// Replace the work directory's contents with freshly unpacked bundles
///
/// Anything left by an earlier run is removed first.
pub fn install(work_dir: &Path, master: &[u8], user: Option<&[u8]>) -> Result<()> {
    clean(work_dir)?;
    prepare_work_dir(work_dir)?;

    let count = unpack(master, work_dir).context("Failed to unpack master bundle")?;
    log::info!("Unpacked {} entries into {}", count, work_dir.display());

    if let Some(bundle) = user {
        let data_bags = work_dir.join("data_bags");
        fs::create_dir_all(&data_bags)
            .with_context(|| format!("Failed to create {}", data_bags.display()))?;

        let count = unpack(bundle, &data_bags).context("Failed to unpack user bundle")?;
        log::info!("Unpacked {} entries into {}", count, data_bags.display());
    }
    Ok(())
}

/// Create the work directory with mode `0700`
pub fn prepare_work_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
            .with_context(|| format!("Failed to create work directory {}", path.display()))?;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to restrict {}", path.display()))
}

/// Remove the work directory and everything in it
pub fn clean(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove work directory {}", path.display()))?;
        log::debug!("Removed {}", path.display());
    }
    Ok(())
}

/// Download a bundle.
fn download(url: &str) -> Result<Vec<u8>> {
    log::debug!("Downloading {}", url);
    let agent = ureq::Agent::new_with_defaults();

    let mut response = agent
        .get(url)
        .header("User-Agent", "accord")
        .call()
        .with_context(|| format!("Failed to download {url}"))?;

    let bytes = response
        .body_mut()
        .with_config()
        .limit(MAX_BUNDLE_SIZE)
        .read_to_vec()
        .context("Failed to read response body")?;

    Ok(bytes)
}

/// Unpack a gzip tar into `dest`, returning the number of entries written
///
/// Entries that would land outside `dest` are skipped.
fn unpack(data: &[u8], dest: &Path) -> Result<usize> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(data));
    archive.set_preserve_permissions(false);

    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.unpack_in(dest)? {
            count += 1;
        } else {
            log::warn!("Skipped unsafe archive entry {}", entry.path()?.display());
        }
    }
    Ok(count)
}
