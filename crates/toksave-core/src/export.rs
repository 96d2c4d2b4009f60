use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::record::ExportRecord;

/// Which activity list to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Liked,
    Bookmarked,
}

impl Mode {
    /// (section, list) keys under "Activity".
    fn keys(self) -> (&'static str, &'static str) {
        match self {
            Mode::Liked => ("Like List", "ItemFavoriteList"),
            Mode::Bookmarked => ("Favorite Videos", "FavoriteVideoList"),
        }
    }
}

/// Read the export file and return the records for `mode`.
pub fn load_export(path: &Path, mode: Mode) -> anyhow::Result<Vec<ExportRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open export: {}", path.display()))?;
    let data: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse export: {}", path.display()))?;
    records_from_value(&data, mode)
        .with_context(|| format!("Malformed export: {}", path.display()))
}

/// Select the list for `mode` from an already parsed export document.
///
/// Accepts both the nested layout (`"Like List": {"ItemFavoriteList": [..]}`)
/// and a flattened one where the list sits directly under the section name.
pub fn records_from_value(data: &serde_json::Value, mode: Mode) -> anyhow::Result<Vec<ExportRecord>> {
    let activity = data
        .get("Activity")
        .ok_or_else(|| anyhow!("missing \"Activity\" object"))?;
    let (section_key, list_key) = mode.keys();

    let list = match activity.get(section_key) {
        Some(section) if section.is_array() => section,
        Some(section) => section
            .get(list_key)
            .ok_or_else(|| anyhow!("missing \"{}\" list in \"{}\"", list_key, section_key))?,
        None => activity
            .get(list_key)
            .ok_or_else(|| anyhow!("missing \"{}\" section", section_key))?,
    };

    // A null list is what the export contains for an account with no activity.
    if list.is_null() {
        return Ok(Vec::new());
    }

    serde_json::from_value(list.clone())
        .with_context(|| format!("\"{}\" is not a list of records", list_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample() -> serde_json::Value {
        json!({
            "Activity": {
                "Like List": {
                    "ItemFavoriteList": [
                        {"Date": "2021-01-01 00:00:00", "Link": "https://www.tiktokv.com/share/video/1/"},
                        {"Date": "2021-01-02 00:00:00", "VideoLink": "https://www.tiktokv.com/share/video/2/"}
                    ]
                },
                "Favorite Videos": {
                    "FavoriteVideoList": [
                        {"Date": "2021-02-01 00:00:00", "Link": "https://www.tiktokv.com/share/video/3/"}
                    ]
                }
            }
        })
    }

    #[test]
    fn test_select_by_mode() {
        let data = sample();
        let liked = records_from_value(&data, Mode::Liked).unwrap();
        assert_eq!(liked.len(), 2);
        assert_eq!(liked[1].link(), Some("https://www.tiktokv.com/share/video/2/"));

        let bookmarked = records_from_value(&data, Mode::Bookmarked).unwrap();
        assert_eq!(bookmarked.len(), 1);
        assert_eq!(bookmarked[0].video_id().unwrap().as_str(), "3");
    }

    #[test]
    fn test_flat_and_null_lists() {
        let flat = json!({"Activity": {"ItemFavoriteList": [{"Link": "x/5", "Date": "d"}]}});
        assert_eq!(records_from_value(&flat, Mode::Liked).unwrap().len(), 1);

        let null = json!({"Activity": {"Favorite Videos": {"FavoriteVideoList": null}}});
        assert!(records_from_value(&null, Mode::Bookmarked).unwrap().is_empty());
    }

    #[test]
    fn test_missing_sections_are_errors() {
        assert!(records_from_value(&json!({}), Mode::Liked).is_err());
        assert!(records_from_value(&json!({"Activity": {}}), Mode::Bookmarked).is_err());
        assert!(records_from_value(&json!({"Activity": {"Like List": {}}}), Mode::Liked).is_err());
    }

    #[test]
    fn test_load_export_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");
        File::create(&path)
            .unwrap()
            .write_all(sample().to_string().as_bytes())
            .unwrap();
        assert_eq!(load_export(&path, Mode::Liked).unwrap().len(), 2);
        assert!(load_export(&dir.path().join("missing.json"), Mode::Liked).is_err());
    }
}
