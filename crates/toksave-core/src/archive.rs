use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;

use crate::ledger::FailureLedger;
use crate::record::{ExportRecord, VideoId};

/// Whether a filename looks like saved media (any `video/*` extension).
pub fn is_media_file(filename: &str) -> bool {
    mime_guess::from_path(filename)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::VIDEO)
}

/// The id a saved filename starts with: the stem up to the first '_'.
pub fn id_from_filename(filename: &str) -> Option<VideoId> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let prefix = stem.split('_').next().unwrap_or(stem);
    VideoId::new(prefix)
}

/// Collect ids that already have a media file in `directory`.
pub fn saved_ids(directory: &Path) -> anyhow::Result<HashSet<VideoId>> {
    let mut ids = HashSet::new();
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read directory: {}", directory.display()))
        }
    };

    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", directory.display()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !is_media_file(&name) {
            continue;
        }
        if let Some(id) = id_from_filename(&name) {
            ids.insert(id);
        }
    }

    Ok(ids)
}

/// Records that still need downloading, in input order.
///
/// Drops records already saved in `directory` and, unless `include_failures`
/// is set, records listed in the failure ledger. A video listed more than once
/// is kept only at its first occurrence. Records without a parseable id are
/// kept so the caller can report them.
pub fn filter_pending(
    records: &[ExportRecord],
    directory: &Path,
    include_failures: bool,
) -> anyhow::Result<Vec<ExportRecord>> {
    let saved = saved_ids(directory)?;
    let ledger = FailureLedger::load(directory)?;

    let mut seen = HashSet::new();
    let pending = records
        .iter()
        .filter(|record| match record.video_id() {
            Ok(id) => {
                !saved.contains(&id)
                    && (include_failures || !ledger.contains(&id))
                    && seen.insert(id)
            }
            Err(_) => true,
        })
        .cloned()
        .collect();

    Ok(pending)
}

/// Add `id` to the directory's failure ledger.
pub fn record_failure(id: &VideoId, directory: &Path) -> anyhow::Result<()> {
    let mut ledger = FailureLedger::load(directory)?;
    if ledger.insert(id.clone()) {
        ledger.save(directory)?;
    }
    Ok(())
}

/// Remove `id` from the directory's failure ledger, if present.
pub fn clear_failure(id: &VideoId, directory: &Path) -> anyhow::Result<()> {
    let mut ledger = FailureLedger::load(directory)?;
    if ledger.remove(id) {
        ledger.save(directory)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LEDGER_FILENAME;
    use std::fs::File;
    use tempfile::tempdir;

    fn record(id: &str) -> ExportRecord {
        ExportRecord::new(
            &format!("https://www.tiktokv.com/share/video/{}/", id),
            "2021-01-01 00:00:00",
        )
    }

    fn id(raw: &str) -> VideoId {
        VideoId::new(raw).unwrap()
    }

    fn ids_of(records: &[ExportRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.video_id().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_saved_ids_from_filenames() {
        let dir = tempdir().unwrap();
        for name in [
            "100.mp4",
            "200_someone_a caption.mp4",
            "300.json",
            "400.mp4.part",
            "notes.txt",
            "abc_def.mp4",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let saved = saved_ids(dir.path()).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.contains(&id("100")));
        assert!(saved.contains(&id("200")));
    }

    #[test]
    fn test_missing_directory_has_nothing_saved() {
        let dir = tempdir().unwrap();
        assert!(saved_ids(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_filter_excludes_saved_and_keeps_order() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("2.mp4")).unwrap();

        let records = vec![record("3"), record("2"), record("1")];
        let pending = filter_pending(&records, dir.path(), false).unwrap();
        assert_eq!(ids_of(&pending), vec!["3", "1"]);
    }

    #[test]
    fn test_repeated_ids_keep_first_occurrence() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("2.mp4")).unwrap();

        let mut bookmarked_again = record("1");
        bookmarked_again.date = Some("2022-06-01 12:00:00".to_string());
        let records = vec![
            record("1"),
            record("2"),
            record("3"),
            bookmarked_again,
            record("2"),
            record("3"),
        ];
        let pending = filter_pending(&records, dir.path(), false).unwrap();
        assert_eq!(ids_of(&pending), vec!["1", "3"]);
        assert_eq!(pending[0], records[0]);
    }

    #[test]
    fn test_failures_skipped_unless_requested() {
        let dir = tempdir().unwrap();
        let records = vec![record("1"), record("2")];

        record_failure(&id("2"), dir.path()).unwrap();
        record_failure(&id("2"), dir.path()).unwrap();
        assert_eq!(FailureLedger::load(dir.path()).unwrap().len(), 1);

        assert_eq!(ids_of(&filter_pending(&records, dir.path(), false).unwrap()), vec!["1"]);
        assert_eq!(
            ids_of(&filter_pending(&records, dir.path(), true).unwrap()),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_clear_failure_makes_eligible_again() {
        let dir = tempdir().unwrap();
        let records = vec![record("7")];

        record_failure(&id("7"), dir.path()).unwrap();
        clear_failure(&id("7"), dir.path()).unwrap();

        for include_failures in [false, true] {
            assert_eq!(
                ids_of(&filter_pending(&records, dir.path(), include_failures).unwrap()),
                vec!["7"]
            );
        }
    }

    #[test]
    fn test_clear_absent_failure_is_noop() {
        let dir = tempdir().unwrap();
        clear_failure(&id("9"), dir.path()).unwrap();
        assert!(!dir.path().join(LEDGER_FILENAME).exists());
    }

    #[test]
    fn test_malformed_records_pass_through() {
        let dir = tempdir().unwrap();
        let broken = ExportRecord {
            link: None,
            video_link: None,
            date: None,
        };
        let pending = filter_pending(&[broken.clone()], dir.path(), false).unwrap();
        assert_eq!(pending, vec![broken]);
    }

    #[test]
    fn test_filter_does_not_write() {
        let dir = tempdir().unwrap();
        filter_pending(&[record("1")], dir.path(), true).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
