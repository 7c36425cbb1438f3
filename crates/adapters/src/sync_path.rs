// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local path <-> web URL mapping for the sync-drive folder a worker writes
//! task artifacts into. Grounded in the original OneDrive-for-Business
//! discovery chain, minus the Windows-registry steps: those need platform
//! APIs none of this codebase's dependencies provide, so resolution here
//! stops at environment variables and a filesystem scan (documented as an
//! explicit scope decision).

use mesh_core::CoordinationError;
use std::path::{Path, PathBuf};

const EXPLICIT_OVERRIDE_ENV: &str = "SYNC_ROOT_DIR";
const COMMERCIAL_ENV: &str = "OneDriveCommercial";
const GENERIC_ENV: &str = "OneDrive";
const SESSIONS_DIR_NAME: &str = "Mesh Sessions";

/// A known mapping between a local sync folder and its web document library,
/// analogous to a single SyncEngines registry entry.
#[derive(Debug, Clone)]
pub struct SyncMapping {
    pub mount_point: PathBuf,
    pub web_url: String,
}

pub fn find_sync_root(business_only: bool, mappings: &[SyncMapping]) -> Result<PathBuf, CoordinationError> {
    if let Ok(explicit) = std::env::var(EXPLICIT_OVERRIDE_ENV) {
        let path = PathBuf::from(explicit);
        if path.is_dir() {
            return Ok(path);
        }
    }

    if let Ok(commercial) = std::env::var(COMMERCIAL_ENV) {
        let path = PathBuf::from(commercial);
        if path.is_dir() {
            return Ok(path);
        }
    }

    if let Ok(generic) = std::env::var(GENERIC_ENV) {
        let path = PathBuf::from(&generic);
        if path.is_dir() {
            let looks_business = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.contains(" - "))
                .unwrap_or(false);
            if !business_only || looks_business {
                return Ok(path);
            }
        }
    }

    for mapping in mappings {
        if mapping.mount_point.is_dir() {
            return Ok(mapping.mount_point.clone());
        }
    }

    if let Some(home) = dirs::home_dir() {
        if business_only {
            if let Ok(entries) = std::fs::read_dir(&home) {
                let mut candidates: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.is_dir()
                            && p.file_name()
                                .and_then(|n| n.to_str())
                                .map(|n| n.starts_with("OneDrive - "))
                                .unwrap_or(false)
                    })
                    .collect();
                candidates.sort();
                if let Some(first) = candidates.into_iter().next() {
                    return Ok(first);
                }
            }
        }
        let plain = home.join("OneDrive");
        if plain.is_dir() {
            return Ok(plain);
        }
    }

    Err(CoordinationError::LogicError(
        "could not find a sync root folder; set SYNC_ROOT_DIR explicitly".to_string(),
    ))
}

/// Whether `path`'s final segment has a non-empty extension. Files that
/// haven't synced to disk yet still pass this test because it never touches
/// the filesystem.
pub fn looks_like_file(path: &Path) -> bool {
    path.extension().map(|ext| !ext.is_empty()).unwrap_or(false)
}

pub fn local_to_web_url(
    local_path: &Path,
    mappings: &[SyncMapping],
    view_in_browser: bool,
) -> Option<String> {
    for mapping in mappings {
        let mount = &mapping.mount_point;
        let relative = local_path.strip_prefix(mount).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        let base = mapping.web_url.trim_end_matches('/');
        if view_in_browser {
            return Some(format!("{base}/{}", urlencode_path(&relative)));
        }
        return Some(if relative.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{}", urlencode_path(&relative))
        });
    }
    None
}

pub fn web_to_local_path(web_url: &str, mappings: &[SyncMapping]) -> Option<PathBuf> {
    for mapping in mappings {
        let base = mapping.web_url.trim_end_matches('/');
        if let Some(relative) = web_url.strip_prefix(base) {
            let relative = relative.trim_start_matches('/');
            let decoded = urldecode_path(relative);
            return Some(mapping.mount_point.join(decoded));
        }
    }
    None
}

fn urlencode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            segment
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                        c.to_string()
                    } else {
                        format!("%{:02X}", c as u32)
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn urldecode_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&path[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Builds the `{title}_{task_id_short}` session folder under
/// `<sync root>/Mesh Sessions/` and creates it on disk.
pub fn create_session_folder(
    sync_root: &Path,
    title: &str,
    task_id: &str,
) -> Result<PathBuf, CoordinationError> {
    let safe_title: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') { c } else { '_' })
        .collect();
    let safe_title: String = safe_title.trim().chars().take(50).collect();
    let short_id = if task_id.is_empty() {
        "no_id".to_string()
    } else {
        task_id.chars().take(8).collect()
    };
    let folder_name = format!("{safe_title}_{short_id}");

    let sessions_root = sync_root.join(SESSIONS_DIR_NAME);
    let session_folder = sessions_root.join(folder_name);
    std::fs::create_dir_all(&session_folder)
        .map_err(|e| CoordinationError::TransientIo(format!("create session folder: {e}")))?;
    Ok(session_folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn file_paths_need_an_extension() {
        assert!(looks_like_file(Path::new("result.md")));
        assert!(!looks_like_file(Path::new("task_folder")));
        assert!(!looks_like_file(Path::new(".gitignore")));
    }

    #[test]
    fn local_to_web_url_round_trips_with_web_to_local() {
        let mappings = vec![SyncMapping {
            mount_point: PathBuf::from("/home/user/OneDrive - Org"),
            web_url: "https://tenant-my.sharepoint.com/personal/user_org_com/Documents".to_string(),
        }];
        let local = PathBuf::from("/home/user/OneDrive - Org/Sessions/task1/result.md");
        let url = local_to_web_url(&local, &mappings, true).unwrap();
        assert_eq!(web_to_local_path(&url, &mappings).unwrap(), local);
    }

    #[test]
    fn url_not_under_any_mapping_returns_none() {
        let mappings = vec![SyncMapping {
            mount_point: PathBuf::from("/home/user/OneDrive - Org"),
            web_url: "https://tenant-my.sharepoint.com/personal/user_org_com/Documents".to_string(),
        }];
        assert!(web_to_local_path("https://example.com/other", &mappings).is_none());
    }

    #[test]
    fn create_session_folder_sanitizes_and_truncates_title() {
        let dir = tempfile::tempdir().unwrap();
        let folder = create_session_folder(
            dir.path(),
            "Write hello world! / with : bad chars",
            "0123456789abcdef",
        )
        .unwrap();
        let name = folder.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_01234567"));
        assert!(folder.exists());
    }

    #[test]
    #[serial]
    fn explicit_override_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(EXPLICIT_OVERRIDE_ENV, dir.path());
        let root = find_sync_root(true, &[]).unwrap();
        std::env::remove_var(EXPLICIT_OVERRIDE_ENV);
        assert_eq!(root, dir.path());
    }
}
