//! Opening inputs and outputs.
//!
//! Inputs may be plain text or gzip/bgzip; compression is detected from the
//! magic bytes rather than the file name.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// Default input buffer size (256 KB).
pub const DEFAULT_INPUT_BUFFER: usize = 256 * 1024;

/// Default output buffer size (2 MB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Boxed buffered reader that can move to the producer thread.
pub type InputReader = Box<dyn BufRead + Send>;

/// Open a path for reading; `-` is stdin.
pub fn open_input<P: AsRef<Path>>(path: P) -> io::Result<InputReader> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        return wrap_reader(io::stdin());
    }
    wrap_reader(File::open(path)?)
}

/// Buffer a reader, transparently decompressing gzip input.
pub fn wrap_reader<R: Read + Send + 'static>(reader: R) -> io::Result<InputReader> {
    let mut buffered = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            DEFAULT_INPUT_BUFFER,
            MultiGzDecoder::new(buffered),
        )))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Open a path for writing; `None` or `-` is stdout.
pub fn open_output<P: AsRef<Path>>(path: Option<P>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(p) if p.as_ref().as_os_str() != "-" => Ok(Box::new(File::create(p)?)),
        _ => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn read_all(mut reader: InputReader) -> String {
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_plain_input() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chr1\t1\t2\n").unwrap();
        file.flush().unwrap();

        assert_eq!(read_all(open_input(file.path()).unwrap()), "chr1\t1\t2\n");
    }

    #[test]
    fn test_gzip_detected_by_magic() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"chr1\t1\t2\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&compressed).unwrap();
        file.flush().unwrap();

        assert_eq!(read_all(open_input(file.path()).unwrap()), "chr1\t1\t2\n");
    }

    #[test]
    fn test_empty_input() {
        let reader = wrap_reader(io::empty()).unwrap();
        assert_eq!(read_all(reader), "");
    }
}
