//! Line-stream endpoints.
//!
//! Every command reads one record per line and writes one record per line.
//! A path of `-`, or no path at all, means stdin/stdout so commands compose
//! in shell pipelines.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::Utf8Error;

use anyhow::{Context, Result};

fn file_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| p.as_os_str() != "-")
}

pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match file_path(path) {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(std::io::stdin()))),
    }
}

/// Line reader that survives bad bytes.
///
/// Each line is decoded on its own, so a line that is not valid UTF-8 comes
/// back as an `Err` for the caller to skip while the stream keeps going. Only
/// I/O failures end the read.
pub struct RawLines<R> {
    reader: R,
    buf: Vec<u8>,
    number: usize,
}

impl<R: BufRead> RawLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            number: 0,
        }
    }

    /// Next line as `(1-based line number, decoded text)`, without its line
    /// terminator. `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<(usize, Result<&str, Utf8Error>)>> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .with_context(|| format!("Failed to read input line {}", self.number + 1))?;
        if read == 0 {
            return Ok(None);
        }
        self.number += 1;
        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        Ok(Some((self.number, std::str::from_utf8(line))))
    }
}

/// Open an output stream, creating parent directories of a file path.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match file_path(path) {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_round_trip_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.jsonl");
        {
            let mut out = open_output(Some(&path)).unwrap();
            writeln!(out, "one").unwrap();
            writeln!(out, "two").unwrap();
            out.flush().unwrap();
        }
        let lines: Vec<String> = open_input(Some(&path))
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn raw_lines_hand_back_undecodable_lines() {
        let input: &[u8] = b"first\r\n\xff\xfe\nlast";
        let mut lines = RawLines::new(input);

        let (n, line) = lines.next_line().unwrap().unwrap();
        assert_eq!((n, line.unwrap()), (1, "first"));
        let (n, line) = lines.next_line().unwrap().unwrap();
        assert_eq!(n, 2);
        assert!(line.is_err());
        let (n, line) = lines.next_line().unwrap().unwrap();
        assert_eq!((n, line.unwrap()), (3, "last"));
        assert!(lines.next_line().unwrap().is_none());
    }

    #[test]
    fn dash_means_stdio() {
        assert!(file_path(Some(Path::new("-"))).is_none());
        assert!(file_path(None).is_none());
        assert!(file_path(Some(Path::new("a.jsonl"))).is_some());
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = open_input(Some(Path::new("/nonexistent/in.jsonl"))).err().unwrap();
        assert!(err.to_string().contains("Failed to open input"));
    }
}
