//! Registered folders: a small piece of persisted configuration (§6) tracking
//! which directories the web UI has offered up for indexing. Lives next to
//! the service as `registered_folders.json`, shape `{"folders": [abs_path, …]}`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegisteredFolders {
    pub folders: Vec<String>,
}

impl RegisteredFolders {
    pub fn load(path: &Path) -> RegisteredFolders {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => RegisteredFolders::default(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let pretty = serde_json::to_string_pretty(self).expect("RegisteredFolders always serializes");
        std::fs::write(path, pretty)
    }

    pub fn register(&mut self, folder: String) {
        if !self.folders.contains(&folder) {
            self.folders.push(folder);
        }
    }

    pub fn unregister(&mut self, folder: &str) {
        self.folders.retain(|f| f != folder);
    }
}

/// Default location for the registered-folders file: alongside the binary's
/// current working directory, matching the "next to the service" phrasing.
pub fn default_folders_path() -> PathBuf {
    PathBuf::from("registered_folders.json")
}
