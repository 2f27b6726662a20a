//! Playlist resolution
//!
//! Turns a source descriptor into the ordered list of media items for one
//! full pass. Folder sources are re-resolved at the start of every pass so
//! files added or removed mid-run are observed on the next pass, never
//! mid-item.

use crate::supervisor::SourceDescriptor;
use loopcast_common::Result;
use std::path::PathBuf;
use tracing::warn;

/// Media file extensions accepted in folder mode (case-insensitive)
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "flv", "ts", "wmv"];

/// Resolve the ordered item list for one pass
///
/// Single-file sources resolve to a one-element list. Folder sources list
/// matching files sorted lexicographically by file name so the pass order
/// is deterministic and reproducible. An empty result is not an error; the
/// caller waits and retries.
pub fn resolve(source: &SourceDescriptor) -> Result<Vec<PathBuf>> {
    match source {
        SourceDescriptor::File(path) => Ok(vec![path.clone()]),
        SourceDescriptor::Folder(dir) => {
            let mut items = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable directory entry: {}", e);
                        continue;
                    }
                };
                let path = entry.path();
                if path.is_file() && has_media_extension(&path) {
                    items.push(path);
                }
            }
            items.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            Ok(items)
        }
    }
}

fn has_media_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}
