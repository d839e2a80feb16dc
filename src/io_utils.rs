//! File I/O shared by the DDL rewriter and the dump sorter.
//!
//! - **Lines**: [`LineReader`] yields [`SourceLine`]s that remember their
//!   original terminator, so untouched lines are written back byte for byte.
//!   Dumps are read with [`RawLines`] instead, which never decodes.
//! - **Encoding**: DDL input is decoded through `encoding_rs_io` (BOM
//!   sniffing picks up UTF-16 scripts); output is UTF-8 unless another
//!   encoding is requested.
//! - **Staging**: results are written to a temporary file beside the
//!   destination and only persisted over it once complete.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use serde::Serialize;
use tempfile::NamedTempFile;

/// Suffix inserted before the extension of a rewritten DDL script.
pub const UPDATED_DDL_SUFFIX: &str = "_UpdatedColumnNames";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::None => "",
        }
    }
}

/// One input line split from its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub body: String,
    pub ending: LineEnding,
}

impl SourceLine {
    pub fn new(body: impl Into<String>, ending: LineEnding) -> Self {
        Self {
            body: body.into(),
            ending,
        }
    }

    pub fn unterminated(body: &str) -> Self {
        Self::new(body, LineEnding::None)
    }

    fn split(raw: &str) -> Self {
        if let Some(body) = raw.strip_suffix("\r\n") {
            Self::new(body, LineEnding::CrLf)
        } else if let Some(body) = raw.strip_suffix('\n') {
            Self::new(body, LineEnding::Lf)
        } else {
            Self::new(raw, LineEnding::None)
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.body.as_bytes())?;
        writer.write_all(self.ending.as_str().as_bytes())
    }
}

/// Pull-based line iterator over any buffered reader.
pub struct LineReader<R> {
    inner: R,
    buffer: String,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.inner.read_line(&mut self.buffer) {
            Ok(0) => None,
            Ok(_) => Some(Ok(SourceLine::split(&self.buffer))),
            Err(err) => Some(Err(err)),
        }
    }
}

/// Undecoded lines with their `\n` or `\r\n` terminator removed.
pub struct RawLines<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: BufRead> RawLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for RawLines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.inner.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                let body = self
                    .buffer
                    .strip_suffix(b"\r\n")
                    .or_else(|| self.buffer.strip_suffix(b"\n"))
                    .unwrap_or(&self.buffer);
                Some(Ok(body.to_vec()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Output encoding for `label`, UTF-8 when absent.
pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    let Some(value) = label else {
        return Ok(UTF_8);
    };
    let encoding = Encoding::for_label(value.trim().as_bytes())
        .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))?;
    if encoding.output_encoding() != encoding {
        return Err(anyhow!(
            "Encoding '{}' can only be read, not written",
            encoding.name()
        ));
    }
    Ok(encoding)
}

/// Forced input encoding for `label`; `None` means sniff the BOM and
/// otherwise assume UTF-8.
pub fn resolve_input_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    label
        .map(|value| {
            Encoding::for_label(value.trim().as_bytes())
                .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
        })
        .transpose()
}

pub fn open_text_reader(
    path: &Path,
    encoding: Option<&'static Encoding>,
) -> Result<BufReader<DecodeReaderBytes<File, Vec<u8>>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(encoding)
        .strip_bom(true)
        .build(file);
    Ok(BufReader::new(decoder))
}

pub fn read_text(path: &Path, encoding: Option<&'static Encoding>) -> Result<String> {
    let mut text = String::new();
    io::Read::read_to_string(&mut open_text_reader(path, encoding)?, &mut text)
        .with_context(|| format!("Reading {path:?}"))?;
    Ok(text)
}

/// Encodes complete UTF-8 writes into the target encoding.
pub struct EncodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
}

impl<W: Write> EncodingWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self { inner, encoding }
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.encoding == UTF_8 {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }
        let text = std::str::from_utf8(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let (encoded, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Text cannot be represented in {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(&encoded)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A temporary file in the destination's directory that replaces the
/// destination only when committed.
pub struct StagedFile {
    destination: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    pub fn create(destination: &Path) -> Result<Self> {
        let directory = parent_dir(destination);
        let temp = NamedTempFile::new_in(directory)
            .with_context(|| format!("Creating temporary file in {directory:?}"))?;
        Ok(Self {
            destination: destination.to_path_buf(),
            temp,
        })
    }

    pub fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    pub fn commit(self) -> Result<()> {
        let destination = self.destination;
        self.temp
            .persist(&destination)
            .map_err(|err| err.error)
            .with_context(|| format!("Replacing {destination:?}"))?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// `dir/name.sql` becomes `dir/name_UpdatedColumnNames.sql`.
pub fn updated_ddl_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| OsString::from("script"));
    name.push(UPDATED_DDL_SUFFIX);
    if let Some(extension) = input.extension() {
        name.push(".");
        name.push(extension);
    }
    input.with_file_name(name)
}

/// Moves `path` into `archive_dir_name` beside it and returns the new path.
pub fn archive_file(path: &Path, archive_dir_name: &str) -> Result<PathBuf> {
    let archive_dir = parent_dir(path).join(archive_dir_name);
    fs::create_dir_all(&archive_dir)
        .with_context(|| format!("Creating archive directory {archive_dir:?}"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{path:?} has no file name to archive"))?;
    let archived = archive_dir.join(file_name);
    fs::rename(path, &archived)
        .with_context(|| format!("Archiving {path:?} to {archived:?}"))?;
    Ok(archived)
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating summary file {path:?}"))?;
    serde_json::to_writer_pretty(file, value).context("Writing summary JSON")
}
