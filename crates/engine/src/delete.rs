use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use logging::{Logger, info_log};

/// Removes sink entries that are absent from the received list.
///
/// Runs strictly after all files transferred. Directories are handled
/// depth-first so an extraneous tree disappears bottom-up; mount points
/// are never crossed and the sink root itself is never removed. Returns
/// the number of entries that could not be deleted.
pub(crate) fn delete_extraneous(
    dest: &Path,
    keep: &HashSet<&str>,
    dry_run: bool,
    logger: Logger,
) -> u32 {
    let Ok(root) = fs::symlink_metadata(dest) else {
        return 0;
    };
    let mut errors = 0;
    sweep(dest, "", root.dev(), keep, dry_run, logger, &mut errors);
    errors
}

fn sweep(
    dir: &Path,
    rel: &str,
    root_dev: u64,
    keep: &HashSet<&str>,
    dry_run: bool,
    logger: Logger,
    errors: &mut u32,
) {
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(err) => {
            logger.error(format_args!("{}: {err}", dir.display()));
            *errors += 1;
            return;
        }
    };

    let mut names: Vec<_> = reader
        .filter_map(|entry| entry.ok().map(|entry| entry.file_name()))
        .collect();
    names.sort();

    for name in names {
        let path = dir.join(&name);
        let child_rel = match name.to_str() {
            Some(name) if rel.is_empty() => name.to_string(),
            Some(name) => format!("{rel}/{name}"),
            None => continue,
        };
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };

        if meta.is_dir() {
            if meta.dev() != root_dev {
                info_log!(logger, 1, "not crossing mount point {}", path.display());
                continue;
            }
            sweep(&path, &child_rel, root_dev, keep, dry_run, logger, errors);
            if !keep.contains(child_rel.as_str()) {
                remove(&path, true, dry_run, logger, errors);
            }
        } else if !keep.contains(child_rel.as_str()) {
            remove(&path, false, dry_run, logger, errors);
        }
    }
}

fn remove(path: &Path, is_dir: bool, dry_run: bool, logger: Logger, errors: &mut u32) {
    info_log!(logger, 1, "deleting {}", path.display());
    if dry_run {
        return;
    }
    let result = if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(err) = result {
        logger.error(format_args!("cannot delete {}: {err}", path.display()));
        *errors += 1;
    }
}
