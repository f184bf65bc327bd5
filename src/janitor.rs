//! Best-effort removal of physical files from a game's files folder.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Why a single file could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Missing,
    PermissionDenied,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub name: String,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    pub deleted: Vec<String>,
    pub failures: Vec<FileFailure>,
}

impl JanitorReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deletes named files inside one folder.
///
/// Failures never abort the batch; each is classified, logged and reported.
#[derive(Debug, Clone)]
pub struct FileJanitor {
    folder: PathBuf,
}

impl FileJanitor {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Deletes `<folder>/<name>` for every name, attempting all of them.
    pub async fn delete_all<I, S>(&self, names: I) -> JanitorReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = JanitorReport::default();
        for name in names {
            let name = name.as_ref();
            match self.delete_one(name).await {
                Ok(()) => report.deleted.push(name.to_string()),
                Err(kind) => {
                    tracing::warn!(
                        folder = %self.folder.display(),
                        file = name,
                        kind = ?kind,
                        "could not delete file"
                    );
                    report.failures.push(FileFailure {
                        name: name.to_string(),
                        kind,
                    });
                }
            }
        }
        report
    }

    async fn delete_one(&self, name: &str) -> Result<(), FailureKind> {
        // Names are ids or the stop sentinel; anything that walks out of the folder is refused.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(FailureKind::Other(format!("refusing to delete {:?}", name)));
        }
        tokio::fs::remove_file(self.folder.join(name))
            .await
            .map_err(|e| classify(&e))
    }

    /// Removes the folder itself. Fails, and logs, if it is not empty.
    pub async fn remove_folder(&self) -> Result<(), FailureKind> {
        tokio::fs::remove_dir(&self.folder).await.map_err(|e| {
            let kind = classify(&e);
            tracing::warn!(
                folder = %self.folder.display(),
                error = %e,
                "could not remove files folder"
            );
            kind
        })
    }
}

fn classify(e: &std::io::Error) -> FailureKind {
    match e.kind() {
        ErrorKind::NotFound => FailureKind::Missing,
        ErrorKind::PermissionDenied => FailureKind::PermissionDenied,
        _ => FailureKind::Other(e.to_string()),
    }
}
