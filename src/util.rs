use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut h = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(format!("{:x}", h.finalize()))
}

/// Decodes the payload of a `data:image/...;base64,` URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    if !data_url.starts_with("data:image") {
        return Err(anyhow!("not an image data URL"));
    }
    let payload = data_url
        .split_once(',')
        .map(|(_, p)| p)
        .ok_or_else(|| anyhow!("data URL has no payload"))?;
    if payload.trim().is_empty() {
        return Err(anyhow!("data URL payload is empty"));
    }
    general_purpose::STANDARD
        .decode(payload.trim())
        .with_context(|| "decoding data URL payload")
}

pub fn file_stem_lossy(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
