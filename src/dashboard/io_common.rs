use std::path::Path;

use debate_session::FileHandle;

use crate::dashboard::config_reader::UploadConfig;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human readable size: `1536` is `1.5 KB`. At most two decimals, trailing
/// zeros removed.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow((unit + 1) as u32) {
        unit += 1;
    }
    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let mut s = format!("{:.2}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{} {}", s, SIZE_UNITS[unit])
}

pub fn to_file_handles(uploads: &[UploadConfig]) -> Vec<FileHandle> {
    uploads
        .iter()
        .map(|u| FileHandle::new(&simplify_file_name(&u.name), u.size, &u.mime_type))
        .collect()
}
