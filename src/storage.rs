//! Storage layer (spec §6): the `FileSource`/`FileSink` collaborator
//! interfaces the core consumes, plus the one filesystem-backed
//! implementation the CLI binaries use. The storage layer is a plain
//! directory; no integrity beyond per-packet checksum (spec §1).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

/// Read chunk-by-offset access to a file being uploaded or downloaded
/// (spec §6).
pub trait FileSource: Send {
    fn size(&self) -> u64;

    /// Read up to `max_bytes` starting at `offset`. An empty result means
    /// EOF.
    fn read_at(&mut self, offset: u64, max_bytes: usize) -> io::Result<Vec<u8>>;
}

/// Append-only destination for a file being received (spec §6). Appends
/// are strictly sequential, matching in-order delivery from the ARQ
/// engine.
pub trait FileSink: Send {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// The transfer completed: make the bytes durable and visible.
    fn finalize(self: Box<Self>) -> io::Result<()>;

    /// The transfer was aborted: discard whatever was written so far.
    fn abort(self: Box<Self>) -> io::Result<()>;
}

/// A [`FileSource`] reading directly from a file on disk.
pub struct FsFileSource {
    file: File,
    size: u64,
}

impl FsFileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(FsFileSource { file, size })
    }
}

impl FileSource for FsFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, max_bytes: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; max_bytes];
        let mut total = 0;
        while total < max_bytes {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(buf)
    }
}

/// A [`FileSink`] writing to a uniquely-named temp file under the store
/// directory, promoted to its final name by an atomic rename on
/// [`FileSink::finalize`].
///
/// This is the resolution of spec §9 Open Question (b): two concurrent
/// uploads of the same filename never contend on the same inode until the
/// final rename, which the OS performs atomically — whichever finalizes
/// last wins, rather than the two transfers being serialized.
pub struct FsFileSink {
    dest_dir: PathBuf,
    final_name: String,
    temp_path: PathBuf,
    file: File,
}

impl FsFileSink {
    pub fn create(dest_dir: impl AsRef<Path>, final_name: &str) -> io::Result<Self> {
        let dest_dir = dest_dir.as_ref().to_path_buf();
        let unique: u64 = rand::thread_rng().gen();
        let temp_path = dest_dir.join(format!(".{final_name}.part-{unique:016x}"));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(FsFileSink {
            dest_dir,
            final_name: final_name.to_string(),
            temp_path,
            file,
        })
    }
}

impl FileSink for FsFileSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn finalize(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.temp_path, self.dest_dir.join(&self.final_name))
    }

    fn abort(self: Box<Self>) -> io::Result<()> {
        let _ = fs::remove_file(&self.temp_path);
        Ok(())
    }
}

impl Drop for FsFileSink {
    /// Best-effort cleanup for paths that never reach `finalize`/`abort` —
    /// e.g. the handshake fails before a session exists to call either.
    /// A no-op once `finalize` has already renamed the temp file away.
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

/// Validate a filename the way the demultiplexer does before allocating a
/// session (spec §4.4): non-empty, no path separators (no directory
/// traversal out of the store directory).
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn read_at_reports_eof_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, b"hello").unwrap();

        let mut src = FsFileSource::open(&path).unwrap();
        assert_eq!(src.size(), 5);
        assert_eq!(src.read_at(0, 5).unwrap(), b"hello");
        assert_eq!(src.read_at(5, 5).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn sink_finalize_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FsFileSink::create(dir.path(), "out.bin").unwrap();
        sink.append(b"abc").unwrap();
        sink.append(b"def").unwrap();
        Box::new(sink).finalize().unwrap();

        let contents = fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(contents, b"abcdef");
    }

    #[test]
    fn sink_abort_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FsFileSink::create(dir.path(), "out.bin").unwrap();
        sink.append(b"abc").unwrap();
        let temp_path = sink.temp_path.clone();
        Box::new(sink).abort().unwrap();

        assert!(!temp_path.exists());
        assert!(!dir.path().join("out.bin").exists());
    }

    #[test]
    fn filename_validation() {
        assert!(is_safe_filename("empty.bin"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename("../escape"));
        assert!(!is_safe_filename("a/b"));
    }

    #[test]
    fn concurrent_uploads_same_name_use_distinct_temp_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsFileSink::create(dir.path(), "x.bin").unwrap();
        let b = FsFileSink::create(dir.path(), "x.bin").unwrap();
        assert_ne!(a.temp_path, b.temp_path);
        let _ = write!(&a.file, ""); // keep `a` alive past the comparison
    }
}
