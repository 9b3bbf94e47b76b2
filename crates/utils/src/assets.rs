use std::{env, io, path::PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const UPLOAD_FOLDER_ENV: &str = "UPLOAD_FOLDER";

/// Parent directory of the process-lifetime temporary file area.
///
/// `UPLOAD_FOLDER` wins; debug builds fall back to `dev_assets/uploads` in the
/// workspace, release builds to the platform cache directory.
pub fn upload_root() -> io::Result<PathBuf> {
    let path = if let Ok(custom_dir) = env::var(UPLOAD_FOLDER_ENV) {
        PathBuf::from(custom_dir)
    } else if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets/uploads")
    } else {
        ProjectDirs::from("org", "railway", "topology-converter")
            .map(|dirs| dirs.cache_dir().join("uploads"))
            .unwrap_or_else(|| env::temp_dir().join("topology-converter"))
    };

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
        tracing::info!("Created upload directory: {}", path.display());
    }

    Ok(path)
    // ✔ macOS → ~/Library/Caches/org.railway.topology-converter/uploads
    // ✔ Linux → ~/.cache/topology-converter/uploads   (respects XDG_CACHE_HOME)
    // ✔ Windows → %LOCALAPPDATA%\railway\topology-converter\cache\uploads
}
