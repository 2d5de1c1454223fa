use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Extension used when the declared name carries none.
pub const DEFAULT_EXTENSION: &str = "mp4";

const DISAMBIGUATOR_LEN: usize = 12;

/// A file on disk owned by exactly one scope.
///
/// The file is deleted when the value is released or dropped, whichever comes
/// first, so every exit path (early return, `?`, panic unwinding) cleans up.
/// Other code only ever sees a borrowed [`Path`].
#[derive(Debug)]
pub struct ManagedTempFile {
    path: PathBuf,
    extension: String,
    released: bool,
}

impl ManagedTempFile {
    /// Writes everything from `reader` to a fresh `<disambiguator>.<ext>` file in `dir`.
    ///
    /// A partially written file is removed before the error is returned.
    pub fn acquire<R: Read + ?Sized>(
        reader: &mut R,
        declared_name: &str,
        dir: &Path,
    ) -> io::Result<Self> {
        let dir = dir.canonicalize()?;
        let extension = extension_of(declared_name);
        let path = unique_path(&dir, &extension);

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let written = io::copy(reader, &mut file).and_then(|n| {
            file.flush()?;
            Ok(n)
        });
        drop(file);

        match written {
            Ok(n) => {
                debug!("Stored {} bytes for {:?} at {}", n, declared_name, path.display());
                Ok(Self {
                    path,
                    extension,
                    released: false,
                })
            }
            Err(e) => {
                remove_quietly(&path);
                Err(e)
            }
        }
    }

    /// Takes ownership of a file some other tool already wrote.
    pub fn adopt(path: PathBuf) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        Self {
            path,
            extension,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Deletes the file now. Errors are logged, not returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        remove_quietly(&self.path);
    }
}

impl Drop for ManagedTempFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Runs `body` with the path of a freshly acquired file and deletes the file
/// afterwards, even if `body` panics.
pub fn scoped<R, F, T>(reader: &mut R, declared_name: &str, dir: &Path, body: F) -> io::Result<T>
where
    R: Read + ?Sized,
    F: FnOnce(&Path) -> T,
{
    let file = ManagedTempFile::acquire(reader, declared_name, dir)?;
    let out = body(file.path());
    file.release();
    Ok(out)
}

/// The substring after the last dot of the declared file name, or
/// [`DEFAULT_EXTENSION`] when there is no dot.
///
/// Only the final path component is considered, so directory parts of a
/// client-supplied name never end up in the generated path.
pub fn extension_of(declared_name: &str) -> String {
    let file_name = declared_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared_name);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => DEFAULT_EXTENSION.to_string(),
    }
}

/// 12 lowercase hex characters from a v4 UUID.
pub fn disambiguator() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(DISAMBIGUATOR_LEN);
    id
}

/// A fresh, not yet created, `<dir>/<disambiguator>.<extension>` path.
pub fn unique_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", disambiguator(), extension))
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed temporary file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
    }
}
