//! Scratch streams backed by temporary files.

use std::fs;
use std::io;
use std::path::Path;

use log;
use tempfile;

use crate::format::{RecordFormat, RecordReader, RecordWriter};

pub type FileReader<T, F> = RecordReader<io::BufReader<fs::File>, T, F>;
pub type FileWriter<T, F> = RecordWriter<io::BufWriter<fs::File>, T, F>;

/// Opens a buffered record reader on a file.
pub fn open_reader<T, F>(path: &Path, format: F, buf_size: Option<usize>) -> io::Result<FileReader<T, F>>
where
    F: RecordFormat<T>,
{
    let file = fs::File::open(path)?;
    Ok(RecordReader::new(buffered_reader(file, buf_size), format))
}

/// Creates (or truncates) a file and opens a buffered record writer on it.
pub fn create_writer<T, F>(path: &Path, format: F, buf_size: Option<usize>) -> io::Result<FileWriter<T, F>>
where
    F: RecordFormat<T>,
{
    let file = fs::File::create(path)?;
    Ok(RecordWriter::new(buffered_writer(file, buf_size), format))
}

fn buffered_reader(file: fs::File, buf_size: Option<usize>) -> io::BufReader<fs::File> {
    match buf_size {
        Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
        None => io::BufReader::new(file),
    }
}

fn buffered_writer(file: fs::File, buf_size: Option<usize>) -> io::BufWriter<fs::File> {
    match buf_size {
        Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
        None => io::BufWriter::new(file),
    }
}

/// Scratch file used as a merge source or sink.
///
/// Every reader or writer opened on it is an independent handle, so a file drained in one merge
/// round can be appended to in the next one once those handles are dropped.
pub struct ScratchFile {
    file: tempfile::NamedTempFile,
}

impl ScratchFile {
    /// Creates an empty scratch file in `dir`.
    pub fn new_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("merge-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        log::trace!("scratch file {} created", file.path().display());

        Ok(ScratchFile { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current file length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens a record reader positioned at the start of the file.
    pub fn reader<T, F>(&self, format: F, buf_size: Option<usize>) -> io::Result<FileReader<T, F>>
    where
        F: RecordFormat<T>,
    {
        let file = self.file.reopen()?;
        Ok(RecordReader::new(buffered_reader(file, buf_size), format))
    }

    /// Opens a record writer appending to the end of the file.
    pub fn appender<T, F>(&self, format: F, buf_size: Option<usize>) -> io::Result<FileWriter<T, F>>
    where
        F: RecordFormat<T>,
    {
        let file = fs::OpenOptions::new().append(true).open(self.path())?;
        Ok(RecordWriter::new(buffered_writer(file, buf_size), format))
    }

    /// Empties the file so it can be reused as a sink.
    pub fn clear(&self) -> io::Result<()> {
        self.file.as_file().set_len(0)
    }

    /// Moves the file to `dest`, copying it when a rename is not possible (e.g. across filesystems).
    pub fn persist(self, dest: &Path) -> io::Result<()> {
        match self.file.persist(dest) {
            Ok(_) => Ok(()),
            Err(err) => {
                log::debug!(
                    "renaming {} failed ({}), copying instead",
                    err.file.path().display(),
                    err.error
                );
                fs::copy(err.file.path(), dest)?;
                Ok(())
            }
        }
    }
}
