use std::path::{Path, PathBuf};

use crate::error::AttachmentError;
use crate::models::{Attachment, AttachmentData};

/// A file ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloadable {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Read a file from disk into an attachment named after the file.
pub async fn attach(path: &Path) -> Result<Attachment, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    tracing::debug!(name = %name, size = bytes.len(), "attached file");
    Ok(attach_bytes(name, bytes))
}

pub fn attach_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Attachment {
    Attachment {
        name: name.into(),
        data: Some(AttachmentData::new(bytes)),
    }
}

/// Filename and payload of an attachment, or `None` when there is no usable
/// file (absent attachment, missing data, or no usable name).
pub fn extract_downloadable(attachment: Option<&Attachment>) -> Option<Downloadable> {
    let attachment = attachment?;
    let Some(data) = &attachment.data else {
        tracing::warn!(name = %attachment.name, "attachment has no data");
        return None;
    };
    let filename = Path::new(&attachment.name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty());
    let Some(filename) = filename else {
        tracing::warn!(name = %attachment.name, "attachment has no usable file name");
        return None;
    };
    Some(Downloadable {
        filename,
        bytes: data.as_bytes().to_vec(),
    })
}

/// Save the attachment into `dir`, never overwriting an existing file
/// ("cv.pdf" becomes "cv (1).pdf", ...). `Ok(None)` if there is nothing to save.
pub async fn download_file(
    attachment: Option<&Attachment>,
    dir: &Path,
) -> Result<Option<PathBuf>, AttachmentError> {
    let Some(download) = extract_downloadable(attachment) else {
        return Ok(None);
    };
    tokio::fs::create_dir_all(dir).await.map_err(write_error(dir))?;
    let target = free_path(dir, &download.filename).await?;
    tokio::fs::write(&target, &download.bytes)
        .await
        .map_err(write_error(&target))?;
    tracing::info!(path = %target.display(), size = download.bytes.len(), "saved attachment");
    Ok(Some(target))
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> AttachmentError + '_ {
    move |source| AttachmentError::Write {
        path: path.to_path_buf(),
        source,
    }
}

async fn free_path(dir: &Path, filename: &str) -> Result<PathBuf, AttachmentError> {
    let candidate = dir.join(filename);
    if !tokio::fs::try_exists(&candidate)
        .await
        .map_err(write_error(&candidate))?
    {
        return Ok(candidate);
    }

    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1;
    loop {
        let numbered = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(numbered);
        if !tokio::fs::try_exists(&candidate)
            .await
            .map_err(write_error(&candidate))?
        {
            return Ok(candidate);
        }
        n += 1;
    }
}
