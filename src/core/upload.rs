use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use actix_multipart::{Field, Multipart};
use chrono::Utc;
use futures_util::TryStreamExt;
use tracing::{debug, info, warn};

use crate::{core::settings::Settings, error::ApiError};

pub const IMAGE_FIELD: &str = "image";
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Where uploaded images go and which of them are accepted.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

/// Text fields of a create request plus the public path of its image, if any.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub image: Option<String>,
}

impl FormData {
    pub fn image_path(&self) -> String {
        self.image.clone().unwrap_or_default()
    }
}

impl From<&Settings> for UploadPolicy {
    fn from(settings: &Settings) -> Self {
        UploadPolicy {
            dir: settings.uploads_dir.clone(),
            max_bytes: settings.max_upload_bytes,
            allowed_types: settings.allowed_types.clone(),
        }
    }
}

impl UploadPolicy {
    pub fn allows(&self, mime: &str) -> bool {
        self.allowed_types.iter().any(|allowed| allowed == mime)
    }

    /// `<epoch-ms><ext>`, keeping the extension of the client's file name.
    pub fn generate_name(&self, original: &str) -> String {
        let extension = Path::new(original)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        format!("{}{}", Utc::now().timestamp_millis(), extension)
    }

    pub fn public_path(file_name: &str) -> String {
        format!("{}/{}", PUBLIC_PREFIX, file_name)
    }

    /// Maps a stored `/uploads/<name>` path back to the file on disk.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX)?.trim_start_matches('/');
        let name = Path::new(name).file_name()?;
        Some(self.dir.join(name))
    }

    /// Best-effort removal of a stored image.
    pub fn remove(&self, public_path: &str) {
        if public_path.is_empty() {
            return;
        }
        match self.resolve(public_path) {
            Some(path) => match fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "deleted image"),
                Err(error) => warn!(path = %path.display(), %error, "failed to delete image file"),
            },
            None => warn!(image = public_path, "image path is outside the uploads directory"),
        }
    }

    /// Reads every part of a multipart create request. On failure nothing
    /// written by this request is left behind.
    pub async fn read_form(&self, mut payload: Multipart) -> Result<FormData, ApiError> {
        let mut form = FormData::default();
        if let Err(error) = self.collect(&mut payload, &mut form).await {
            if let Some(image) = form.image.take() {
                self.remove(&image);
            }
            return Err(error);
        }
        Ok(form)
    }

    async fn collect(&self, payload: &mut Multipart, form: &mut FormData) -> Result<(), ApiError> {
        while let Some(mut field) = payload.try_next().await? {
            let name = field.name().unwrap_or_default().to_owned();
            let file_name = field
                .content_disposition()
                .and_then(|disposition| disposition.get_filename())
                .map(str::to_owned);

            match file_name {
                // An empty file input still sends a part, with no file name.
                Some(original) if original.is_empty() => drain(&mut field).await?,
                Some(original) => {
                    if name != IMAGE_FIELD || form.image.is_some() {
                        return Err(ApiError::UnexpectedFile(name));
                    }
                    let stored = self.store_file(&mut field, &original).await?;
                    form.image = Some(Self::public_path(&stored));
                }
                None if name.is_empty() => drain(&mut field).await?,
                None => {
                    let value = read_text(&mut field).await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(())
    }

    async fn store_file(&self, field: &mut Field, original: &str) -> Result<String, ApiError> {
        let mime = field
            .content_type()
            .map(|mime| mime.essence_str().to_owned())
            .unwrap_or_default();
        if !self.allows(&mime) {
            return Err(ApiError::InvalidFileType(mime));
        }

        let stored = self.generate_name(original);
        let path = self.dir.join(&stored);
        match self.write_limited(field, &path).await {
            Ok(size) => {
                info!(file = %stored, size, "stored upload");
                Ok(stored)
            }
            Err(error) => {
                if let Err(remove_error) = fs::remove_file(&path) {
                    debug!(path = %path.display(), %remove_error, "no partial upload to remove");
                }
                Err(error)
            }
        }
    }

    async fn write_limited(&self, field: &mut Field, path: &Path) -> Result<u64, ApiError> {
        let mut file = File::create(path)?;
        let mut written: u64 = 0;
        while let Some(chunk) = field.try_next().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(ApiError::FileTooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk)?;
        }
        file.flush()?;
        Ok(written)
    }
}

async fn read_text(field: &mut Field) -> Result<String, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn drain(field: &mut Field) -> Result<(), ApiError> {
    while field.try_next().await?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(dir: &Path) -> UploadPolicy {
        let mut settings = Settings::new();
        settings.uploads_dir = dir.to_path_buf();
        UploadPolicy::from(&settings)
    }

    #[test]
    fn allow_list_matches_exact_types() {
        let policy = policy(Path::new("uploads"));
        assert!(policy.allows("image/jpeg"));
        assert!(policy.allows("image/png"));
        assert!(policy.allows("image/gif"));
        assert!(!policy.allows("image/webp"));
        assert!(!policy.allows("text/plain"));
        assert!(!policy.allows(""));
    }

    #[test]
    fn generated_name_keeps_extension() {
        let policy = policy(Path::new("uploads"));

        let name = policy.generate_name("holiday.photo.JPG");
        let (stamp, ext) = name.split_once('.').unwrap();
        assert!(stamp.parse::<i64>().is_ok());
        assert_eq!(ext, "JPG");

        let bare = policy.generate_name("noext");
        assert!(bare.parse::<i64>().is_ok());
    }

    #[test]
    fn resolve_stays_inside_uploads_dir() {
        let policy = policy(Path::new("/srv/uploads"));
        assert_eq!(
            policy.resolve("/uploads/123.png"),
            Some(PathBuf::from("/srv/uploads/123.png"))
        );
        assert_eq!(
            policy.resolve("/uploads/../../etc/passwd"),
            Some(PathBuf::from("/srv/uploads/passwd"))
        );
        assert_eq!(policy.resolve("/elsewhere/123.png"), None);
    }

    #[test]
    fn remove_deletes_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let policy = policy(dir.path());
        let file = dir.path().join("42.gif");
        fs::write(&file, b"GIF89a").unwrap();

        policy.remove("/uploads/42.gif");
        assert!(!file.exists());

        policy.remove("/uploads/42.gif");
        policy.remove("");
    }
}
