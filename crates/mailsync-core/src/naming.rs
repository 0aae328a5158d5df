//! Mapping storage file names to endpoint names.
//!
//! An endpoint backed by `/var/lib/boxes/boat42.sqlite.db` is named
//! `boat42`: the file name up to its first `.`.

use std::path::Path;

use crate::types::EndpointName;

/// Derive an endpoint name from a database path.
///
/// Returns `None` if the path has no file name or the derived name is not a
/// valid identifier.
pub fn endpoint_name_from_path(path: impl AsRef<Path>) -> Option<EndpointName> {
    let file_name = path.as_ref().file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    EndpointName::new(stem).ok()
}
