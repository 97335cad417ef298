//! Shell-script stand-in for the stream-copy binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `sh` script whose body runs after `last` is bound to
/// the output path and every argument is logged to `args.txt`.
pub fn fake_remuxer(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("fake-ffmpeg");
    let args_file = dir.join("args.txt");
    let contents = format!(
        "#!/bin/sh\nfor last; do :; done\nprintf '%s\\n' \"$@\" > '{}'\n{body}\n",
        args_file.display()
    );
    std::fs::write(&script, contents).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// Arguments the last run of [`fake_remuxer`] received, one per line.
pub fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
