//! Locating files relative to the test that asks for them.

use std::path::{Path, PathBuf};

/// How many directories, starting with the first one, are searched upwards.
pub const MAX_LEVELS: usize = 10;

/// Absolute directory of a source file, given the crate's manifest directory and
/// the path `file!()` reported for it.
///
/// `file!()` is relative to the directory cargo ran rustc from, which is the
/// manifest directory for a standalone crate and the workspace root for a member,
/// so the manifest directory and its ancestors are tried in turn.
pub fn source_dir(manifest_dir: &str, file: &str) -> PathBuf {
    let manifest_dir = Path::new(manifest_dir);
    let file = Path::new(file);

    let source = if file.is_absolute() {
        file.to_path_buf()
    } else {
        manifest_dir
            .ancestors()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| manifest_dir.join(file))
    };

    source
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

/// Absolute directory of the source file this macro is expanded in.
#[macro_export]
macro_rules! caller_dir {
    () => {
        $crate::paths::source_dir(env!("CARGO_MANIFEST_DIR"), file!())
    };
}

/// `<caller dir>/testdata/<file>`, for the source file this macro is expanded in.
#[macro_export]
macro_rules! test_data_path {
    ($file:expr) => {
        $crate::paths::test_data_file_path(&$crate::caller_dir!(), $file)
    };
}

/// `<caller_dir>/testdata/<file>`. The file does not have to exist.
pub fn test_data_file_path(caller_dir: &Path, file: impl AsRef<Path>) -> PathBuf {
    caller_dir.join("testdata").join(file)
}

/// The closest `migrations` directory at or above `start`, or `./migrations`.
pub fn find_migrations_dir(start: &Path) -> PathBuf {
    walk_up(start, |dir| dir.join("migrations").is_dir())
        .map(|dir| dir.join("migrations"))
        .unwrap_or_else(|| PathBuf::from("./migrations"))
}

/// The closest directory at or above `start` holding a `Cargo.toml`, or `.`.
pub fn project_root(start: &Path) -> PathBuf {
    walk_up(start, |dir| dir.join("Cargo.toml").is_file()).unwrap_or_else(|| PathBuf::from("."))
}

fn walk_up(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start
        .ancestors()
        .take(MAX_LEVELS)
        .find(|dir| found(dir))
        .map(Path::to_path_buf)
}
