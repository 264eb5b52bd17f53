use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use log::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::report_kind::ReportKind;
use crate::util;


pub const IMAGE_PUBLIC_DIR: &str = "images/";
const PUBLIC_URL_PREFIX: &str = "/static/";
const ALLOWED_EXTS: [&str; 6] = ["jpeg", "jpg", "png", "bmp", "gif", "webp"];
const MAX_KEY_LEN: usize = 256;


/// Decodes a `data:image/<ext>;base64,...` URI into a new staged file and
/// returns the key of that file.
pub fn stage_data_uri(config: &Config, data_uri: &str) -> AppResult<String> {
    if data_uri.len() > config.upload_limit {
        return Err(AppError::invalid("The file is too large"));
    }

    let (header, payload) = data_uri.split_once(',')
        .ok_or_else(|| AppError::invalid("Invalid uri"))?;

    // Get file extension.
    let ext = header.strip_prefix("data:")
        .and_then(|x| x.split('/').nth(1))
        .and_then(|x| x.split(';').next())
        .map(|x| x.to_ascii_lowercase())
        .ok_or_else(|| AppError::invalid("Invalid uri"))?;

    if !ALLOWED_EXTS.iter().any(|&x| x == ext) {
        return Err(AppError::invalid("Invalid extension"));
    }

    let bytes = base64::decode(payload.trim())
        .map_err(|err| AppError::invalid(err.to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::invalid("Empty image"));
    }

    fs::create_dir_all(&config.upload_dir)?;

    // Create unique id and file for the image.
    let (key, mut file) = loop {
        let key = util::generate_rand_id(32) + "." + &ext;
        let file_result = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(config.upload_dir.join(&key));

        match file_result {
            Ok(file) => break (key, file),
            Err(ref err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    };

    file.write_all(&bytes)?;

    Ok(key)
}

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.contains("..")
        && !key.contains('/')
        && !key.contains('\\')
}

/// Moves staged images into the public folder of `kind`.
/// On failure every image already moved by this call is removed again.
pub fn promote(config: &Config, kind: ReportKind, keys: &[String]) -> AppResult<Vec<String>> {
    if let Some(key) = keys.iter().find(|k| !is_valid_key(k)) {
        warn!("Rejected image key: {}", key);
        return Err(AppError::invalid("Invalid image key"));
    }

    let public_dir = config.image_public_dir().join(kind.slug());
    fs::create_dir_all(&public_dir)?;

    let mut urls = Vec::with_capacity(keys.len());

    for key in keys {
        let staged = config.upload_dir.join(key);
        if !staged.is_file() {
            remove_public(config, &urls);
            return Err(AppError::invalid("No images uploaded"));
        }

        let move_result = fs::copy(&staged, public_dir.join(key))
            .and_then(|_| fs::remove_file(&staged));

        if let Err(err) = move_result {
            warn!("Fail to promote image {}: {}", key, err);
            let _ = fs::remove_file(public_dir.join(key));
            remove_public(config, &urls);
            return Err(err.into());
        }

        urls.push(format!("{}{}{}/{}", PUBLIC_URL_PREFIX, IMAGE_PUBLIC_DIR, kind.slug(), key));
    }

    Ok(urls)
}

/// Filesystem path behind a public image URL.
pub fn url_to_path(config: &Config, url: &str) -> Option<PathBuf> {
    let rel = url.strip_prefix(PUBLIC_URL_PREFIX)?;
    if !rel.starts_with(IMAGE_PUBLIC_DIR) || rel.contains("..") {
        return None;
    }

    Some(config.static_dir.join(rel))
}

/// Deletes the files behind `urls`. Missing files are ignored.
pub fn remove_public(config: &Config, urls: &[String]) {
    for url in urls {
        match url_to_path(config, url) {
            Some(path) if path.is_file() => {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("Fail to remove image {}: {}", path.display(), err);
                }
            },
            Some(_) => (),
            None => warn!("Not a public image url: {}", url),
        }
    }
}

/// Deletes staged files older than `max_age` and returns how many went.
pub fn purge_stale_staging(config: &Config, max_age: Duration) -> io::Result<usize> {
    let dir = Path::new(&config.upload_dir);
    if !dir.is_dir() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cnt = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }

        let age = meta.modified()
            .ok()
            .and_then(|t| now.duration_since(t).ok())
            .unwrap_or_default();

        if age > max_age {
            fs::remove_file(entry.path())?;
            cnt += 1;
        }
    }

    if cnt > 0 {
        info!("Purged {} abandoned uploads", cnt);
    }

    Ok(cnt)
}
