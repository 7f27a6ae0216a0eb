//! File reading with typed error mapping for the `file`/`load` operators.

use graft_base::{Error, ExternalSource, Result};
use std::path::Path;

/// Reads a file as UTF-8 text.
pub fn read_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| {
        Error::external(
            ExternalSource::File,
            format!("could not read {}: {e}", path.display()),
        )
    })
}

/// Reads a file's raw bytes.
pub fn read_file_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        Error::external(
            ExternalSource::File,
            format!("could not read {}: {e}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_file_returns_contents() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "hello").unwrap();
        assert_eq!(read_file(tmp.path()).unwrap(), "hello");
    }

    #[test]
    fn missing_file_is_an_external_error() {
        let err = read_file("/definitely/not/here.txt").unwrap_err();
        assert_eq!(
            err.kind,
            graft_base::ErrorKind::External(ExternalSource::File)
        );
    }
}
