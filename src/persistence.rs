use {
    crate::pipeline::provider_info::ServedSnapshot,
    std::{fs, path::Path},
};

pub type PersistenceError = Box<dyn std::error::Error + Send + Sync>;

/// Write the served snapshot as pretty JSON
///
/// The file is written next to the target and renamed into place, so readers
/// never see a partial document.
pub fn save_served_snapshot(snapshot: &ServedSnapshot, file_path: &str) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = format!("{}.tmp", file_path);

    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, file_path)?;

    log::debug!(
        "💾 Saved snapshot for epoch {} ({} providers) to {}",
        snapshot.epoch_id,
        snapshot.providers_info.len(),
        file_path
    );
    Ok(())
}

/// Load a previously written snapshot; `None` when the file does not exist
pub fn load_served_snapshot(file_path: &str) -> Result<Option<ServedSnapshot>, PersistenceError> {
    if !Path::new(file_path).exists() {
        log::info!("No existing snapshot file found: {}", file_path);
        return Ok(None);
    }

    let json = fs::read_to_string(file_path)?;
    let snapshot: ServedSnapshot = serde_json::from_str(&json)?;

    log::info!(
        "Loaded snapshot for epoch {} ({} providers) from {}",
        snapshot.epoch_id,
        snapshot.providers_info.len(),
        file_path
    );
    Ok(Some(snapshot))
}
