//! Split an observation CSV into numbered parts and locate them again.
//!
//! Part files sit next to the input as `<stem>.part<k>.<ext>` with `k`
//! starting at 0. Every part repeats the header.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::io::table::{create_csv, finish, open_csv, read_records, write_row};

/// Split `path` into parts of at most `chunk_size` rows.
///
/// Existing parts of `path` are removed first. A `chunk_size` of 0 returns
/// the input path unchanged.
pub fn split_file(path: &Path, chunk_size: usize) -> Result<Vec<PathBuf>, AppError> {
    if chunk_size == 0 {
        return Ok(vec![path.to_path_buf()]);
    }
    let (mut reader, header) = open_csv(path, "observation file")?;
    let records = read_records(&mut reader, path)?;

    // Parts from an earlier split would otherwise outlive this one.
    for stale in list_parts(path)? {
        fs::remove_file(&stale).map_err(|e| {
            AppError::config(format!("Failed to remove old part '{}': {e}", stale.display()))
        })?;
    }

    let mut parts = Vec::new();
    for (k, chunk) in records.chunks(chunk_size).enumerate() {
        let part = part_path(path, k);
        let what = "observation chunk";
        let mut w = create_csv(&part, what)?;
        write_row(&mut w, &header.names, what)?;
        for (_, rec) in chunk {
            write_row(&mut w, rec, what)?;
        }
        finish(w, what)?;
        parts.push(part);
    }
    log::info!(
        "split {} rows of {} into {} parts",
        records.len(),
        path.display(),
        parts.len()
    );
    Ok(parts)
}

/// `<stem>.part<k>.<ext>` next to `path`.
pub fn part_path(path: &Path, k: usize) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.part{k}.{}", ext.to_string_lossy()),
        None => format!("{stem}.part{k}"),
    };
    path.with_file_name(name)
}

/// Existing parts of `path`, sorted by part number.
pub fn list_parts(path: &Path) -> Result<Vec<PathBuf>, AppError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let prefix = format!("{stem}.part");

    let entries = fs::read_dir(&dir).map_err(|e| {
        AppError::config(format!("Failed to list '{}': {e}", dir.display()))
    })?;
    let mut parts: Vec<(usize, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let k = name
                .strip_prefix(&prefix)?
                .strip_suffix(&suffix)?
                .parse::<usize>()
                .ok()?;
            Some((k, entry.path()))
        })
        .collect();
    parts.sort_by_key(|(k, _)| *k);
    Ok(parts.into_iter().map(|(_, p)| p).collect())
}

/// Part `k` of `path` (0-based, in part-number order).
pub fn find_part(path: &Path, k: usize) -> Result<PathBuf, AppError> {
    let parts = list_parts(path)?;
    if parts.is_empty() {
        return Err(AppError::config(format!(
            "No parts found for '{}' (run `split` first).",
            path.display()
        )));
    }
    let n = parts.len();
    parts.into_iter().nth(k).ok_or_else(|| {
        AppError::config(format!(
            "Chunk {k} out of range: '{}' has {n} parts.",
            path.display()
        ))
    })
}
