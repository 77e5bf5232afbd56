use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufReader, Read},
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings file: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub host: Ipv4Addr,
    pub port: u16,
    pub properties_path: PathBuf,
    pub projects_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 5000,
            properties_path: PathBuf::from("properties.json"),
            projects_path: PathBuf::from("projects.json"),
            uploads_dir: PathBuf::from("uploads"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
            ],
        }
    }

    /// Reads overrides from `path`. A missing file means built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Settings::new()),
            Err(error) => return Err(error.into()),
        };
        let mut buffer = Vec::new();
        BufReader::new(file).read_to_end(&mut buffer)?;
        Ok(serde_json::from_slice::<Settings>(&buffer)?)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}
