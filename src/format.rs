//! Record formats and streams.

use std::error::Error;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

/// Record format interface. Provides methods for writing a record to a stream and reading the next one back.
pub trait RecordFormat<T>: Clone {
    type SerializationError: Error + 'static;
    type DeserializationError: Error + 'static;

    /// Writes a single record.
    fn write<W: Write>(&self, writer: &mut W, record: &T) -> Result<(), Self::SerializationError>;

    /// Reads the next record. Returns [`None`] at the end of the stream.
    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<T, Self::DeserializationError>>;
}

/// Newline-delimited records.
///
/// Records are raw bytes (`Vec<u8>`) compared byte-wise, so any input can be sorted whatever its encoding.
/// `String` records are supported too, in which case every line must be valid UTF-8.
///
/// A trailing `\n` or `\r\n` is stripped on read. Empty lines are records too, and the last line
/// of a stream is read even without a terminating newline.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormat;

impl RecordFormat<Vec<u8>> for LineFormat {
    type SerializationError = io::Error;
    type DeserializationError = io::Error;

    fn write<W: Write>(&self, writer: &mut W, record: &Vec<u8>) -> Result<(), Self::SerializationError> {
        writer.write_all(record)?;
        writer.write_all(b"\n")
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<Vec<u8>, Self::DeserializationError>> {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with(b"\n") {
                    line.pop();
                    if line.ends_with(b"\r") {
                        line.pop();
                    }
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

impl RecordFormat<String> for LineFormat {
    type SerializationError = io::Error;
    type DeserializationError = io::Error;

    fn write<W: Write>(&self, writer: &mut W, record: &String) -> Result<(), Self::SerializationError> {
        writer.write_all(record.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<String, Self::DeserializationError>> {
        let line = <Self as RecordFormat<Vec<u8>>>::read(self, reader)?;
        Some(line.and_then(|line| {
            String::from_utf8(line).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
        }))
    }
}

/// RMP (Rust MessagePack) record format.
/// Records are stored as consecutive MessagePack values.
/// For more information see https://msgpack.org/.
pub struct RmpFormat<T> {
    item_type: PhantomData<T>,
}

impl<T> RmpFormat<T> {
    pub fn new() -> Self {
        RmpFormat { item_type: PhantomData }
    }
}

impl<T> Default for RmpFormat<T> {
    fn default() -> Self {
        RmpFormat::new()
    }
}

impl<T> Clone for RmpFormat<T> {
    fn clone(&self) -> Self {
        RmpFormat::new()
    }
}

impl<T> RecordFormat<T> for RmpFormat<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type SerializationError = rmp_serde::encode::Error;
    type DeserializationError = rmp_serde::decode::Error;

    fn write<W: Write>(&self, mut writer: &mut W, record: &T) -> Result<(), Self::SerializationError> {
        rmp_serde::encode::write(&mut writer, record)
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<T, Self::DeserializationError>> {
        match reader.fill_buf() {
            Ok(buf) if buf.is_empty() => None,
            Ok(_) => Some(rmp_serde::decode::from_read(reader)),
            Err(err) => Some(Err(rmp_serde::decode::Error::InvalidMarkerRead(err))),
        }
    }
}

/// Iterator over the records of a stream.
pub struct RecordReader<R, T, F> {
    reader: R,
    format: F,

    item_type: PhantomData<T>,
}

impl<R, T, F> RecordReader<R, T, F>
where
    R: BufRead,
    F: RecordFormat<T>,
{
    pub fn new(reader: R, format: F) -> Self {
        RecordReader {
            reader,
            format,
            item_type: PhantomData,
        }
    }
}

impl<R, T, F> Iterator for RecordReader<R, T, F>
where
    R: BufRead,
    F: RecordFormat<T>,
{
    type Item = Result<T, F::DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.format.read(&mut self.reader)
    }
}

/// Record sink over a stream.
pub struct RecordWriter<W, T, F>
where
    W: Write,
{
    writer: W,
    format: F,
    written: u64,

    item_type: PhantomData<T>,
}

impl<W, T, F> RecordWriter<W, T, F>
where
    W: Write,
    F: RecordFormat<T>,
{
    pub fn new(writer: W, format: F) -> Self {
        RecordWriter {
            writer,
            format,
            written: 0,
            item_type: PhantomData,
        }
    }

    /// Writes a single record.
    pub fn write(&mut self, record: &T) -> Result<(), F::SerializationError> {
        self.format.write(&mut self.writer, record)?;
        self.written += 1;

        return Ok(());
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes buffered records to the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor};

    use rstest::*;
    use serde::{Deserialize, Serialize};

    use super::{LineFormat, RecordReader, RecordWriter, RmpFormat};

    #[rstest]
    #[case("", vec![])]
    #[case("a\nb\n", vec!["a", "b"])]
    #[case("a\nb", vec!["a", "b"])]
    #[case("a\r\n\nb\n", vec!["a", "", "b"])]
    #[case("\n\n", vec!["", ""])]
    fn test_line_reader(#[case] input: &str, #[case] expected: Vec<&str>) {
        let reader = RecordReader::new(Cursor::new(input.as_bytes()), LineFormat);
        let actual: Result<Vec<String>, io::Error> = reader.collect();

        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_line_reader_bytes() {
        let reader = RecordReader::new(Cursor::new(b"b\n\xff\xfe\r\na".to_vec()), LineFormat);
        let actual: Result<Vec<Vec<u8>>, io::Error> = reader.collect();

        assert_eq!(actual.unwrap(), vec![b"b".to_vec(), vec![0xff, 0xfe], b"a".to_vec()]);
    }

    #[test]
    fn test_line_reader_invalid_utf8() {
        let mut reader = RecordReader::<_, String, _>::new(Cursor::new(b"b\n\xff\xfe\na\n".to_vec()), LineFormat);

        assert_eq!(reader.next().unwrap().unwrap(), "b");
        assert_eq!(reader.next().unwrap().unwrap_err().kind(), io::ErrorKind::InvalidData);
        assert_eq!(reader.next().unwrap().unwrap(), "a");
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_line_writer() {
        let mut writer = RecordWriter::new(Vec::new(), LineFormat);
        for line in ["b", "", "a"] {
            writer.write(&line.to_string()).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(writer.written(), 3);
        assert_eq!(writer.writer, b"b\n\na\n");
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        key: u32,
        value: String,
    }

    #[test]
    fn test_rmp_format() {
        let saved = vec![
            Entry {
                key: 2,
                value: "two".into(),
            },
            Entry {
                key: 1,
                value: "one".into(),
            },
        ];

        let mut writer = RecordWriter::new(Vec::new(), RmpFormat::new());
        for entry in &saved {
            writer.write(entry).unwrap();
        }

        let reader = RecordReader::new(Cursor::new(writer.writer), RmpFormat::<Entry>::new());
        let restored: Result<Vec<Entry>, _> = reader.collect();

        assert_eq!(restored.unwrap(), saved);
    }
}
