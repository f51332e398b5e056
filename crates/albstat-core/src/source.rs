// Local log sources: plain or gzip files, read line by line.
// Only local paths are read; logs must already be downloaded.

use crate::error::SourceError;
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const LOG_EXTENSIONS: [&str; 3] = ["log", "gz", "txt"];

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Open a log file, decompressing `.gz` files on the fly
pub fn open_log(path: &Path) -> Result<Box<dyn BufRead + Send>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    if is_gzip(path) {
        // load balancers write one gzip member per flush
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Lines of a reader, decoded lossily so one bad byte never drops a line.
/// Trailing `\n` / `\r\n` are removed.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Log files directly inside `dir`, sorted by name.
/// A missing directory gives an empty list.
pub fn find_local_log_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.as_ref().display(), error = %e, "No log directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| LOG_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    #[test]
    fn test_lossy_lines() {
        let data = b"first\r\nsec\xffond\nlast".to_vec();
        let lines: Vec<String> = LossyLines::new(Cursor::new(data))
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["first", "sec\u{FFFD}ond", "last"]);
    }

    #[test]
    fn test_open_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(b"one\ntwo\n").unwrap();
        encoder.finish().unwrap();

        let lines: Vec<String> = LossyLines::new(open_log(&path).unwrap())
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_log(Path::new("/definitely/not/here.log")).err().unwrap();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_find_local_log_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.log", "a.gz", "c.txt", "notes.md"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("sub.log")).unwrap();

        let files = find_local_log_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.gz", "b.log", "c.txt"]);
        assert!(find_local_log_files(dir.path().join("missing")).is_empty());
    }
}
