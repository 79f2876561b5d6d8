use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const INDEX_FILE: &str = "index.json";

pub(crate) fn clear_dir_files(dir: &Path, keep_index: bool) -> (usize, u64) {
    let mut removed_files = 0usize;
    let mut removed_bytes = 0u64;

    let Ok(rd) = fs::read_dir(dir) else {
        return (0, 0);
    };
    for ent in rd.flatten() {
        let p = ent.path();
        if p.is_dir() {
            continue;
        }
        if keep_index && p.file_name().is_some_and(|n| n == INDEX_FILE) {
            continue;
        }

        if let Ok(md) = ent.metadata() {
            removed_bytes = removed_bytes.saturating_add(md.len());
        }
        if fs::remove_file(&p).is_ok() {
            removed_files += 1;
        }
    }

    (removed_files, removed_bytes)
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
