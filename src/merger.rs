//! K-way merge pass engine.

use std::cmp::Ordering;

use log;

use crate::format::RecordFormat;
use crate::heap::{BoundedHeap, Compare};
use crate::sort::SortError;
use crate::stream::{FileReader, ScratchFile};

/// Heap node binding a source scratch file to its current head item.
pub struct MergeNode<'a, T, R> {
    file: &'a ScratchFile,
    reader: Option<FileReader<T, R>>,
    head: Option<T>,
}

impl<'a, T, R> MergeNode<'a, T, R>
where
    R: RecordFormat<T>,
{
    /// Current head item, [`None`] once the source is exhausted.
    pub fn head(&self) -> Option<&T> {
        self.head.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.head.is_none()
    }

    /// Reads the next head item. On end of stream the reader is closed and the backing file emptied.
    fn advance(&mut self) -> Result<(), SortError<R::SerializationError, R::DeserializationError>> {
        let next = match self.reader.as_mut() {
            Some(reader) => reader.next(),
            None => None,
        };

        self.head = match next {
            Some(item) => Some(item.map_err(SortError::DeserializationError)?),
            None => {
                self.reader = None;
                self.file.clear().map_err(SortError::IO)?;
                log::trace!("source {} exhausted", self.file.path().display());
                None
            }
        };

        return Ok(());
    }
}

/// Node ordering: live nodes by their head items, exhausted nodes after all live ones.
struct NodeOrder<F>(F);

impl<'a, T, R, F> Compare<MergeNode<'a, T, R>> for NodeOrder<F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &MergeNode<'a, T, R>, b: &MergeNode<'a, T, R>) -> Ordering {
        match (&a.head, &b.head) {
            (Some(a), Some(b)) => (self.0)(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// K-way merger.
/// Each call to [`create_pass`](KWayMerger::create_pass) merges the next run of every attached source
/// into a single ascending run. Sources whose current run is finished are evicted from the active part
/// of the heap but stay attached, so repeated passes consume all runs of all sources.
/// At most `k` sources are attached, so at most `k + 1` files are open at any time.
pub struct KWayMerger<'a, T, F, R>
where
    F: Fn(&T, &T) -> Ordering,
{
    heap: BoundedHeap<MergeNode<'a, T, R>, NodeOrder<F>>,
    compare: F,
    format: R,
    rw_buf_size: Option<usize>,
}

impl<'a, T, F, R> KWayMerger<'a, T, F, R>
where
    F: Fn(&T, &T) -> Ordering + Copy,
    R: RecordFormat<T>,
{
    /// Creates a merger accepting up to `k` sources.
    ///
    /// # Arguments
    /// * `k` - Merge fan-in
    /// * `compare` - Function to be used to compare items
    /// * `format` - Scratch file record format
    /// * `rw_buf_size` - Scratch file read/write buffer size
    pub fn new(k: usize, compare: F, format: R, rw_buf_size: Option<usize>) -> Self {
        return KWayMerger {
            heap: BoundedHeap::new(k, NodeOrder(compare)),
            compare,
            format,
            rw_buf_size,
        };
    }

    /// Number of attached sources.
    pub fn sources(&self) -> usize {
        self.heap.len()
    }

    /// Checks whether every attached source has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.heap.iter().all(MergeNode::is_exhausted)
    }

    /// Attaches a source file, reading its first item.
    pub fn add_file(
        &mut self,
        file: &'a ScratchFile,
    ) -> Result<(), SortError<R::SerializationError, R::DeserializationError>> {
        if self.heap.is_full() {
            return Err(SortError::FanInExceeded(self.heap.capacity()));
        }

        let reader = file.reader(self.format.clone(), self.rw_buf_size).map_err(SortError::IO)?;
        let mut node = MergeNode {
            file,
            reader: Some(reader),
            head: None,
        };
        node.advance()?;

        log::trace!("source {} attached", file.path().display());
        if self.heap.insert(node).is_err() {
            return Err(SortError::FanInExceeded(self.heap.capacity()));
        }

        return Ok(());
    }

    /// Merges the current run of every attached source into one run appended to `sink`.
    /// Returns the number of items written.
    pub fn create_pass(
        &mut self,
        sink: &ScratchFile,
    ) -> Result<u64, SortError<R::SerializationError, R::DeserializationError>> {
        self.heap.reactivate();
        self.heap.exclude(MergeNode::is_exhausted);

        let mut writer = sink.appender(self.format.clone(), self.rw_buf_size).map_err(SortError::IO)?;
        let mut last: Option<T> = None;

        loop {
            let writable = match self.heap.peek().and_then(MergeNode::head) {
                Some(head) => match &last {
                    Some(last) => (self.compare)(head, last) != Ordering::Less,
                    None => true,
                },
                None => false,
            };

            if writable {
                if let Some(node) = self.heap.peek_mut() {
                    if let Some(head) = node.head.take() {
                        writer.write(&head).map_err(SortError::SerializationError)?;
                        last = Some(head);
                    }
                    node.advance()?;
                }
                self.heap.downheap(0);
            } else if self.heap.active_len() > 1 {
                // the root's run is over (or its source is exhausted), keep it for the next pass
                self.heap.shrink();
            } else {
                break;
            }
        }

        writer.flush().map_err(SortError::IO)?;
        log::trace!("pass of {} items written to {}", writer.written(), sink.path().display());

        return Ok(writer.written());
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::KWayMerger;
    use crate::format::LineFormat;
    use crate::sort::SortError;
    use crate::stream::ScratchFile;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn scratch_with(dir: &tempfile::TempDir, lines: &[&str]) -> ScratchFile {
        let file = ScratchFile::new_in(dir.path()).unwrap();
        let mut writer = file.appender(LineFormat, None).unwrap();
        for line in lines {
            writer.write(&line.to_string()).unwrap();
        }
        writer.flush().unwrap();
        file
    }

    fn read_lines(file: &ScratchFile) -> Vec<String> {
        let lines: Result<Vec<String>, io::Error> = file.reader(LineFormat, None).unwrap().collect();
        lines.unwrap()
    }

    #[rstest]
    fn test_two_runs(tmp_dir: tempfile::TempDir) {
        let sources = vec![
            scratch_with(&tmp_dir, &["1", "4", "7"]),
            scratch_with(&tmp_dir, &["2", "3", "9"]),
        ];
        let sink = ScratchFile::new_in(tmp_dir.path()).unwrap();

        let mut merger = KWayMerger::new(2, String::cmp, LineFormat, None);
        for source in &sources {
            merger.add_file(source).unwrap();
        }

        assert_eq!(merger.create_pass(&sink).unwrap(), 6);
        assert!(merger.is_exhausted());
        assert_eq!(read_lines(&sink), vec!["1", "2", "3", "4", "7", "9"]);
        for source in &sources {
            assert!(source.is_empty().unwrap());
        }
    }

    #[rstest]
    fn test_passes_consume_runs_in_order(tmp_dir: tempfile::TempDir) {
        let sources = vec![
            scratch_with(&tmp_dir, &["1", "5", "2", "3", "0"]),
            scratch_with(&tmp_dir, &["4", "6", "1"]),
            scratch_with(&tmp_dir, &["3"]),
        ];
        let sinks: Vec<ScratchFile> = (0..3).map(|_| ScratchFile::new_in(tmp_dir.path()).unwrap()).collect();

        let mut merger = KWayMerger::new(3, String::cmp, LineFormat, None);
        for source in &sources {
            merger.add_file(source).unwrap();
        }
        assert_eq!(merger.sources(), 3);

        let mut written = Vec::new();
        let mut pass = 0;
        while !merger.is_exhausted() {
            written.push(merger.create_pass(&sinks[pass % sinks.len()]).unwrap());
            pass += 1;
        }

        assert_eq!(written, vec![5, 3, 1]);
        assert_eq!(read_lines(&sinks[0]), vec!["1", "3", "4", "5", "6"]);
        assert_eq!(read_lines(&sinks[1]), vec!["1", "2", "3"]);
        assert_eq!(read_lines(&sinks[2]), vec!["0"]);
        for source in &sources {
            assert!(source.is_empty().unwrap());
        }
    }

    #[rstest]
    fn test_empty_source(tmp_dir: tempfile::TempDir) {
        let sources = vec![scratch_with(&tmp_dir, &[]), scratch_with(&tmp_dir, &["a", "b"])];
        let sink = ScratchFile::new_in(tmp_dir.path()).unwrap();

        let mut merger = KWayMerger::new(2, String::cmp, LineFormat, None);
        for source in &sources {
            merger.add_file(source).unwrap();
        }

        assert_eq!(merger.create_pass(&sink).unwrap(), 2);
        assert!(merger.is_exhausted());
        assert_eq!(read_lines(&sink), vec!["a", "b"]);
        assert_eq!(merger.create_pass(&sink).unwrap(), 0);
    }

    #[rstest]
    fn test_fan_in_exceeded(tmp_dir: tempfile::TempDir) {
        let sources = vec![scratch_with(&tmp_dir, &["a"]), scratch_with(&tmp_dir, &["b"])];

        let mut merger = KWayMerger::new(1, String::cmp, LineFormat, None);
        merger.add_file(&sources[0]).unwrap();

        match merger.add_file(&sources[1]) {
            Err(SortError::FanInExceeded(1)) => {}
            Err(err) => panic!("unexpected error: {}", err),
            Ok(()) => panic!("second source attached to a 1-way merger"),
        }
    }
}
