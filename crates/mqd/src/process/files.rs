use std::fs::Permissions;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::Builder;

/// Replaces `path` with `contents` through a synced temporary file in the
/// same directory, so readers see either the old or the new payload.
pub(super) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "path has no parent directory"))?;
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let mut file = Builder::new()
        .prefix(prefix)
        .permissions(Permissions::from_mode(0o600))
        .tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
