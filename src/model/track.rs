use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempPath;

use crate::api::api_types::TrackInfo;

/// A downloaded audio file which is deleted when it is no longer needed.
///
/// The file is removed exactly once: either by [`AudioFile::remove`] or,
/// failing that, when the value is dropped.
#[derive(Debug)]
pub struct AudioFile {
    path: TempPath,
}

impl AudioFile {
    pub(crate) fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. Failures are logged, never returned. A file that
    /// is already gone counts as removed.
    pub fn remove(self) {
        let path = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "removed audio file"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "error removing audio file")
            }
        }
    }
}

/// A track waiting in, or playing from, a session's queue.
///
/// Owns its audio file, so a track can only ever live in one session.
#[derive(Debug)]
pub struct Track {
    title: String,
    generation_id: String,
    file: AudioFile,
}

impl Track {
    pub(crate) fn new(title: String, generation_id: String, file: AudioFile) -> Self {
        Self {
            title,
            generation_id,
            file,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn generation_id(&self) -> &str {
        &self.generation_id
    }

    pub fn file_path(&self) -> &Path {
        self.file.path()
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            title: self.title.clone(),
            generation_id: self.generation_id.clone(),
            file_path: PathBuf::from(self.file.path()),
        }
    }

    /// Throws the track away, deleting its audio file.
    pub(crate) fn discard(self) {
        self.file.remove();
    }
}

#[cfg(test)]
pub(crate) fn track_in(dir: &Path, title: &str) -> Track {
    let path = tempfile::Builder::new()
        .prefix("track-")
        .suffix(".mp3")
        .tempfile_in(dir)
        .unwrap()
        .into_temp_path();
    Track::new(
        title.to_string(),
        format!("gen-{title}"),
        AudioFile::new(path),
    )
}
