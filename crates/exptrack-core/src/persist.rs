use serde::Serialize;
use std::path::Path;

/// Writes `value` as pretty JSON using a temp file + rename so readers never
/// observe a half-written file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> crate::TrackerResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
