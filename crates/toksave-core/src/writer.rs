use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::fetcher::{MediaContent, VideoDescriptor};
use crate::record::{Timestamp, VideoId};

/// Maximum caption length (in characters) kept in pretty filenames
const MAX_CAPTION_CHARS: usize = 50;

const DEFAULT_EXTENSION: &str = "mp4";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Paths written for one video.
#[derive(Debug, Clone)]
pub struct SavedFiles {
    pub media: PathBuf,
    pub json: Option<PathBuf>,
}

/// Strip characters that are unsafe in filenames and collapse whitespace.
pub fn sanitize_component(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    let cleaned: String = normalized
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = WHITESPACE_RE.replace_all(&cleaned, " ");
    collapsed.trim().trim_matches('.').trim().to_string()
}

/// `{id}`, or `{id}_{author}_{caption}` with pretty names (empty parts omitted).
pub fn file_stem(id: &VideoId, descriptor: &VideoDescriptor, pretty_names: bool) -> String {
    if !pretty_names {
        return id.to_string();
    }

    let author = sanitize_component(&descriptor.author);
    let caption: String = sanitize_component(&descriptor.caption)
        .chars()
        .take(MAX_CAPTION_CHARS)
        .collect();

    let mut stem = id.to_string();
    for part in [author.as_str(), caption.trim_end()] {
        if !part.is_empty() {
            stem.push('_');
            stem.push_str(part);
        }
    }
    stem
}

/// File extension for a media MIME type.
pub fn extension_for(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return DEFAULT_EXTENSION;
    };
    match mime_guess::get_mime_extensions_str(mime) {
        Some(exts) if exts.contains(&DEFAULT_EXTENSION) => DEFAULT_EXTENSION,
        Some(exts) => exts.first().copied().unwrap_or(DEFAULT_EXTENSION),
        None => DEFAULT_EXTENSION,
    }
}

/// Write `bytes` next to `dest` and rename into place, so a half-written
/// file never carries the final name.
fn write_atomic(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut temp_name = dest.as_os_str().to_owned();
    temp_name.push(".part");
    let temp_path = PathBuf::from(temp_name);

    let file = File::create(&temp_path)
        .with_context(|| format!("Failed to create: {}", temp_path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    drop(writer);

    fs::rename(&temp_path, dest)
        .with_context(|| format!("Failed to write: {}", dest.display()))?;
    Ok(())
}

fn set_times(path: &Path, timestamp: Timestamp) {
    let ft = filetime::FileTime::from_unix_time(timestamp, 0);
    if let Err(e) = filetime::set_file_times(path, ft, ft) {
        tracing::debug!(path = %path.display(), error = %e, "could not set file times");
    }
}

/// Save media (and optionally the descriptor as JSON) into `directory`.
pub fn save(
    directory: &Path,
    descriptor: &VideoDescriptor,
    media: &MediaContent,
    timestamp: Timestamp,
    id: &VideoId,
    pretty_names: bool,
    include_json: bool,
) -> anyhow::Result<SavedFiles> {
    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create directory: {}", directory.display()))?;

    let stem = file_stem(id, descriptor, pretty_names);
    let ext = extension_for(media.mime_type.as_deref().or(descriptor.mime_type.as_deref()));

    // Sidecar first: the media file is what marks the video as saved.
    let json = if include_json {
        let json_path = directory.join(format!("{}.json", stem));
        let bytes = serde_json::to_vec_pretty(&descriptor.raw)?;
        write_atomic(&json_path, &bytes)?;
        set_times(&json_path, timestamp);
        Some(json_path)
    } else {
        None
    };

    let media_path = directory.join(format!("{}.{}", stem, ext));
    write_atomic(&media_path, &media.bytes)?;
    set_times(&media_path, timestamp);

    Ok(SavedFiles {
        media: media_path,
        json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive;
    use serde_json::json;
    use tempfile::tempdir;

    fn descriptor(author: &str, caption: &str) -> VideoDescriptor {
        VideoDescriptor {
            id: VideoId::new("123").unwrap(),
            author: author.to_string(),
            caption: caption.to_string(),
            media_url: "http://example.invalid/123".to_string(),
            mime_type: Some("video/mp4".to_string()),
            raw: json!({"id": "123", "desc": caption}),
        }
    }

    fn media() -> MediaContent {
        MediaContent {
            bytes: b"video bytes".to_vec(),
            mime_type: None,
        }
    }

    #[test]
    fn test_plain_stem() {
        let id = VideoId::new("123").unwrap();
        assert_eq!(file_stem(&id, &descriptor("a", "b"), false), "123");
    }

    #[test]
    fn test_pretty_stem() {
        let id = VideoId::new("123").unwrap();
        let d = descriptor("some.one", "what? a/b  \"test\"\n#fyp");
        assert_eq!(file_stem(&id, &d, true), "123_some.one_what ab test #fyp");

        let long = descriptor("x", &"y".repeat(80));
        assert_eq!(file_stem(&id, &long, true), format!("123_x_{}", "y".repeat(50)));

        assert_eq!(file_stem(&id, &descriptor("", ""), true), "123");
        assert_eq!(file_stem(&id, &descriptor("", "hi"), true), "123_hi");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("video/mp4")), "mp4");
        assert_eq!(extension_for(Some("video/webm")), "webm");
        assert_eq!(extension_for(Some("application/x-unknown-thing")), "mp4");
        assert_eq!(extension_for(None), "mp4");
    }

    #[test]
    fn test_save_with_json() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("videos");
        let id = VideoId::new("123").unwrap();

        let saved = save(&target, &descriptor("a", "b"), &media(), 1_609_459_200, &id, false, true).unwrap();

        assert_eq!(saved.media, target.join("123.mp4"));
        assert_eq!(fs::read(&saved.media).unwrap(), b"video bytes");
        let sidecar: serde_json::Value =
            serde_json::from_slice(&fs::read(saved.json.unwrap()).unwrap()).unwrap();
        assert_eq!(sidecar["id"], "123");

        let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(&saved.media).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_609_459_200);

        let names: Vec<String> = fs::read_dir(&target)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".part")));
    }

    #[test]
    fn test_save_without_json_overwrites() {
        let dir = tempdir().unwrap();
        let id = VideoId::new("123").unwrap();
        fs::write(dir.path().join("123_a_b.mp4"), b"old").unwrap();

        let saved = save(dir.path(), &descriptor("a", "b"), &media(), 0, &id, true, false).unwrap();
        assert!(saved.json.is_none());
        assert_eq!(fs::read(&saved.media).unwrap(), b"video bytes");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_saved_file_is_recognized() {
        let dir = tempdir().unwrap();
        let id = VideoId::new("123").unwrap();
        save(dir.path(), &descriptor("a", "b"), &media(), 0, &id, true, true).unwrap();
        assert!(archive::saved_ids(dir.path()).unwrap().contains(&id));
    }
}
