use anyhow::Context;
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Advisory lock on a file beside the state, held for the duration of one run.
///
/// The OS drops the lock when the handle closes, including when the process
/// dies, so a leftover file never blocks later runs. The file itself is left
/// in place; deleting it while another process waits on it would split the lock.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

impl RunLock {
    pub fn acquire<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating lock directory {}", path.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("opening run lock {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "acquiring run lock {} (another export is running)",
                path.display()
            )
        })?;

        file.set_len(0)
            .with_context(|| format!("resetting run lock {}", path.display()))?;
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("writing run lock {}", path.display()))?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(RunLock::acquire(&path).is_err());

        drop(first);
        let again = RunLock::acquire(&path).unwrap();
        drop(again);
    }

    #[test]
    fn leftover_file_from_dead_process_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.lock");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "999999\n").unwrap();

        let lock = RunLock::acquire(&path).unwrap();
        let recorded = fs::read_to_string(&path).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());
        drop(lock);
    }
}
