use crate::progress::{ProgressSink, ScanSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use walkdir::WalkDir;

/// Extensions the scanner accepts, compared case-insensitively. A GIF
/// contributes its first frame only.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// One discovered image: its path and the mtime the ordering is built on.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Everything the walk produced, with the records already in playback order.
#[derive(Debug)]
pub struct ScanOutcome {
    pub records: Vec<ImageRecord>,
    pub folders_scanned: u64,
    /// Matched files dropped because their metadata could not be read.
    pub skipped: u64,
    /// Matched-file count per (lowercased) extension, for the summary.
    pub format_counts: BTreeMap<String, u64>,
}

fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Walk `root` recursively, collect every readable image file, and return
/// them sorted ascending by modification time.
///
/// The sort is stable, so files whose timestamps tie stay in the order the
/// walk found them. That order follows filesystem enumeration semantics and
/// is an accepted nondeterminism boundary, not something this function pins
/// down.
///
/// Per-entry failures (unreadable directory, vanished file, unstattable
/// metadata) are warned through `sink` and skipped; they never abort the
/// walk. The caller validates `root` itself before calling.
pub fn scan_ordered(root: &Path, sink: &dyn ProgressSink) -> ScanOutcome {
    let started = Instant::now();
    let mut records: Vec<ImageRecord> = Vec::new();
    let mut folders_scanned: u64 = 0;
    let mut skipped: u64 = 0;
    let mut format_counts: BTreeMap<String, u64> = BTreeMap::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                skipped += 1;
                sink.warn(&format!("skipping unreadable entry: {err}"));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            folders_scanned += 1;
            sink.scan_update(&ScanSnapshot {
                folders_scanned,
                files_found: records.len() as u64,
                elapsed: started.elapsed(),
            });
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(ext) = image_extension(path) else {
            continue;
        };

        // Ordering needs the mtime; a file we cannot stat cannot be placed
        // and is dropped here rather than failing the whole batch.
        let modified = entry
            .metadata()
            .map_err(anyhow::Error::from)
            .and_then(|m| m.modified().map_err(anyhow::Error::from));
        let modified = match modified {
            Ok(t) => t,
            Err(err) => {
                skipped += 1;
                sink.warn(&format!("skipping {}: {err}", path.display()));
                continue;
            }
        };

        *format_counts.entry(ext).or_insert(0) += 1;
        records.push(ImageRecord {
            path: path.to_path_buf(),
            modified,
        });
    }

    sink.scan_update(&ScanSnapshot {
        folders_scanned,
        files_found: records.len() as u64,
        elapsed: started.elapsed(),
    });

    order_records(&mut records);

    ScanOutcome {
        records,
        folders_scanned,
        skipped,
        format_counts,
    }
}

/// Chronological ordering: ascending mtime, discovery order on ties.
/// `sort_by_key` is a stable sort, which is what makes the tie-break hold.
pub fn order_records(records: &mut [ImageRecord]) {
    records.sort_by_key(|r| r.modified);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopSink;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(name: &str, secs: u64) -> ImageRecord {
        ImageRecord {
            path: PathBuf::from(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert_eq!(image_extension(Path::new("a.png")).as_deref(), Some("png"));
        assert_eq!(image_extension(Path::new("b.JPG")).as_deref(), Some("jpg"));
        assert_eq!(
            image_extension(Path::new("c.JpEg")).as_deref(),
            Some("jpeg")
        );
        assert_eq!(image_extension(Path::new("d.GIF")).as_deref(), Some("gif"));
        assert_eq!(image_extension(Path::new("e.bmp")), None);
        assert_eq!(image_extension(Path::new("f.png.txt")), None);
        assert_eq!(image_extension(Path::new("noext")), None);
    }

    #[test]
    fn ordering_is_ascending_by_mtime() {
        let mut records = vec![record("c", 30), record("a", 10), record("b", 20)];
        order_records(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }

    #[test]
    fn equal_timestamps_keep_discovery_order() {
        let mut records = vec![
            record("late", 50),
            record("tie-first", 20),
            record("tie-second", 20),
            record("early", 10),
            record("tie-third", 20),
        ];
        order_records(&mut records);
        let names: Vec<_> = records
            .iter()
            .map(|r| r.path.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["early", "tie-first", "tie-second", "tie-third", "late"]
        );
    }

    #[test]
    fn scan_descends_into_nested_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("a/b/c")).expect("mkdirs");
        fs::write(root.join("top.png"), b"x").expect("write");
        fs::write(root.join("a/mid.JPG"), b"x").expect("write");
        fs::write(root.join("a/b/c/deep.jpeg"), b"x").expect("write");
        fs::write(root.join("a/b/c/notes.txt"), b"x").expect("write");

        let outcome = scan_ordered(root, &NoopSink);
        assert_eq!(outcome.records.len(), 3);
        // root, a, a/b, a/b/c
        assert_eq!(outcome.folders_scanned, 4);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.format_counts.get("png"), Some(&1));
        assert_eq!(outcome.format_counts.get("jpg"), Some(&1));
        assert_eq!(outcome.format_counts.get("jpeg"), Some(&1));
    }

    #[test]
    fn scan_orders_by_mtime_not_by_name() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path();
        // Names sort one way, mtimes the other.
        for (name, secs) in [("aaa.png", 300), ("bbb.png", 100), ("ccc.png", 200)] {
            let path = root.join(name);
            fs::write(&path, b"x").expect("write");
            filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(secs, 0))
                .expect("set mtime");
        }

        let outcome = scan_ordered(root, &NoopSink);
        let names: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["bbb.png", "ccc.png", "aaa.png"]);
    }

    #[test]
    fn scan_emits_a_snapshot_per_directory() {
        struct Recorder(Mutex<Vec<ScanSnapshot>>);
        impl ProgressSink for Recorder {
            fn scan_update(&self, snapshot: &ScanSnapshot) {
                self.0.lock().unwrap().push(*snapshot);
            }
            fn frame_done(&self, _done: u64, _total: u64) {}
            fn warn(&self, _message: &str) {}
        }

        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path();
        fs::create_dir(root.join("sub")).expect("mkdir");
        fs::write(root.join("one.png"), b"x").expect("write");
        fs::write(root.join("sub/two.png"), b"x").expect("write");

        let sink = Recorder(Mutex::new(Vec::new()));
        let outcome = scan_ordered(root, &sink);
        assert_eq!(outcome.records.len(), 2);

        let snaps = sink.0.into_inner().unwrap();
        // One per directory plus the final one.
        assert_eq!(snaps.len(), 3);
        let last = snaps.last().unwrap();
        assert_eq!(last.folders_scanned, 2);
        assert_eq!(last.files_found, 2);
        // Counters only ever grow.
        for pair in snaps.windows(2) {
            assert!(pair[1].folders_scanned >= pair[0].folders_scanned);
            assert!(pair[1].files_found >= pair[0].files_found);
        }
    }
}
