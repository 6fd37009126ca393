//! Balanced k-way sort-merge.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::distribute::distribute;
use crate::format::{LineFormat, RecordFormat};
use crate::merger::KWayMerger;
use crate::runs::RunGenerator;
use crate::stream::{self, ScratchFile};

/// Run file extension.
pub const RUNS_EXTENSION: &str = "runs";
/// Sorted file extension.
pub const SORTED_EXTENSION: &str = "sorted";

/// Sorting error.
#[derive(Debug)]
pub enum SortError<S: Error, D: Error> {
    /// Heap size is less than 1.
    InvalidHeapSize(usize),
    /// Merge fan-in is less than 2.
    InvalidFanIn(usize),
    /// Merge input is not a run file.
    InvalidExtension(PathBuf),
    /// More sources attached to a merger than its fan-in.
    FanInExceeded(usize),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Record write error: the record format failed to encode or write a record.
    SerializationError(S),
    /// Record read error: the record format failed to read or decode a record.
    DeserializationError(D),
    /// Scratch files ended up in a state the merge cannot continue from.
    InternalConsistency(&'static str),
}

impl<S, D> Error for SortError<S, D>
where
    S: Error + 'static,
    D: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::SerializationError(err) => Some(err),
            SortError::DeserializationError(err) => Some(err),
            _ => None,
        }
    }
}

impl<S: Error, D: Error> Display for SortError<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidHeapSize(size) => write!(f, "heap size must be greater than 0, got {}", size),
            SortError::InvalidFanIn(k) => write!(f, "merge fan-in must be greater than 1, got {}", k),
            SortError::InvalidExtension(path) => {
                write!(f, "{} is not a .{} file", path.display(), RUNS_EXTENSION)
            }
            SortError::FanInExceeded(k) => write!(f, "more than {} sources attached to a merger", k),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "record write error: {}", err),
            SortError::DeserializationError(err) => write!(f, "record read error: {}", err),
            SortError::InternalConsistency(msg) => write!(f, "internal consistency error: {}", msg),
        }
    }
}

/// Sorting error of a record format.
pub type FormatError<T, R> =
    SortError<<R as RecordFormat<T>>::SerializationError, <R as RecordFormat<T>>::DeserializationError>;

/// Run generation summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunsReport {
    /// Generated run file.
    pub path: PathBuf,
    /// Number of generated runs.
    pub runs: usize,
    /// Number of records written.
    pub records: u64,
}

/// Merge summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Sorted file.
    pub path: PathBuf,
    /// Number of runs found in the run file.
    pub runs: usize,
    /// Total number of merge passes.
    pub passes: usize,
    /// Number of merge rounds, each one swapping the roles of the scratch file sets.
    pub rounds: usize,
}

/// Two scratch file sets whose source and sink roles swap every merge round.
struct FileSets {
    left: Vec<ScratchFile>,
    right: Vec<ScratchFile>,
    /// `true` when `left` holds the sources.
    left_to_right: bool,
}

impl FileSets {
    fn new(left: Vec<ScratchFile>, right: Vec<ScratchFile>) -> Self {
        FileSets {
            left,
            right,
            left_to_right: true,
        }
    }

    /// Current `(sources, sinks)`.
    fn roles(&self) -> (&[ScratchFile], &[ScratchFile]) {
        if self.left_to_right {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        }
    }

    fn swap(&mut self) {
        self.left_to_right = !self.left_to_right;
    }

    /// Indices `(set, slot)` of every non-empty file, left set first.
    fn non_empty(&self) -> io::Result<Vec<(usize, usize)>> {
        let mut found = Vec::new();
        for (set_idx, set) in [&self.left, &self.right].iter().enumerate() {
            for (slot, file) in set.iter().enumerate() {
                if !file.is_empty()? {
                    found.push((set_idx, slot));
                }
            }
        }
        return Ok(found);
    }

    fn take(self, set_idx: usize, slot: usize) -> Option<ScratchFile> {
        let set = if set_idx == 0 { self.left } else { self.right };
        set.into_iter().nth(slot)
    }
}

/// Merge scheduler.
/// Repeatedly merges the runs of one scratch file set into the other until a single run is left.
struct MergeScheduler<'s, T, F, R>
where
    F: Fn(&T, &T) -> Ordering + Copy,
    R: RecordFormat<T>,
{
    k: usize,
    compare: F,
    format: &'s R,
    rw_buf_size: Option<usize>,

    item_type: std::marker::PhantomData<T>,
}

impl<'s, T, F, R> MergeScheduler<'s, T, F, R>
where
    F: Fn(&T, &T) -> Ordering + Copy,
    R: RecordFormat<T>,
{
    /// Runs merge rounds until convergence. Returns `(passes, rounds)`.
    fn run(&self, sets: &mut FileSets) -> Result<(usize, usize), FormatError<T, R>> {
        let mut passes = 0;
        let mut rounds = 0;

        while sets.non_empty().map_err(SortError::IO)?.len() > 1 {
            passes += self.round(sets)?;
            rounds += 1;
            sets.swap();
        }

        return Ok((passes, rounds));
    }

    /// Merges every run of the source set into the sink set. Returns the number of passes.
    fn round(&self, sets: &FileSets) -> Result<usize, FormatError<T, R>> {
        let (sources, sinks) = sets.roles();

        let mut merger = KWayMerger::new(self.k, self.compare, self.format.clone(), self.rw_buf_size);
        for source in sources {
            if !source.is_empty().map_err(SortError::IO)? {
                merger.add_file(source)?;
            }
        }
        log::debug!("merge round started ({} sources)", merger.sources());

        let mut passes = 0;
        loop {
            let written = merger.create_pass(&sinks[passes % sinks.len()])?;
            passes += 1;

            if all_empty(sources).map_err(SortError::IO)? {
                break;
            }
            if written == 0 {
                return Err(SortError::InternalConsistency("merge pass made no progress"));
            }
        }
        log::debug!("merge round done ({} passes)", passes);

        return Ok(passes);
    }
}

fn all_empty(files: &[ScratchFile]) -> io::Result<bool> {
    for file in files {
        if !file.is_empty()? {
            return Ok(false);
        }
    }
    return Ok(true);
}

/// Balanced sorter builder. Provides methods for [`BalancedSorter`] initialization.
#[derive(Clone)]
pub struct BalancedSorterBuilder<R = LineFormat> {
    /// Run generation heap size.
    heap_size: usize,
    /// Merge fan-in.
    fan_in: usize,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// File read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Record format.
    format: R,
}

impl BalancedSorterBuilder<LineFormat> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        BalancedSorterBuilder::default()
    }
}

impl Default for BalancedSorterBuilder<LineFormat> {
    fn default() -> Self {
        BalancedSorterBuilder {
            heap_size: 1024,
            fan_in: 8,
            tmp_dir: None,
            rw_buf_size: None,
            format: LineFormat,
        }
    }
}

impl<R> BalancedSorterBuilder<R> {
    /// Builds a [`BalancedSorter`] instance using provided configuration.
    pub fn build<T>(self) -> Result<BalancedSorter<R>, FormatError<T, R>>
    where
        R: RecordFormat<T>,
    {
        BalancedSorter::new::<T>(
            self.heap_size,
            self.fan_in,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.format,
        )
    }

    /// Sets the maximum number of records held in memory during run generation.
    pub fn with_heap_size(mut self, heap_size: usize) -> BalancedSorterBuilder<R> {
        self.heap_size = heap_size;
        return self;
    }

    /// Sets the number of runs merged at once.
    pub fn with_fan_in(mut self, fan_in: usize) -> BalancedSorterBuilder<R> {
        self.fan_in = fan_in;
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> BalancedSorterBuilder<R> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> BalancedSorterBuilder<R> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets record format.
    pub fn with_format<N>(self, format: N) -> BalancedSorterBuilder<N> {
        BalancedSorterBuilder {
            heap_size: self.heap_size,
            fan_in: self.fan_in,
            tmp_dir: self.tmp_dir,
            rw_buf_size: self.rw_buf_size,
            format,
        }
    }
}

/// Balanced k-way sorter.
///
/// Sorting is done in two phases, each reading one file and producing another:
/// * [`create_runs`](BalancedSorter::create_runs) turns `<input>` into `<input>.runs`, a concatenation
///   of ascending runs generated by replacement selection;
/// * [`merge_runs`](BalancedSorter::merge_runs) turns `<name>.runs` into `<name>.sorted` by distributing
///   the runs over `k` scratch files and merging them back and forth between two scratch file sets.
pub struct BalancedSorter<R = LineFormat> {
    /// Run generation heap size.
    heap_size: usize,
    /// Merge fan-in.
    fan_in: usize,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// File read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Record format.
    format: R,
}

impl<R> BalancedSorter<R> {
    /// Creates a new balanced sorter instance.
    ///
    /// # Arguments
    /// * `heap_size` - Maximum number of records held in memory during run generation, at least 1.
    /// * `fan_in` - Number of runs merged at once, at least 2.
    /// * `tmp_path` - Directory to be used to store temporary data. If parameter is [`None`] default OS
    ///   temporary directory will be used.
    /// * `rw_buf_size` - File read/write buffer size.
    /// * `format` - Record format of every file involved.
    pub fn new<T>(
        heap_size: usize,
        fan_in: usize,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        format: R,
    ) -> Result<Self, FormatError<T, R>>
    where
        R: RecordFormat<T>,
    {
        if heap_size < 1 {
            return Err(SortError::InvalidHeapSize(heap_size));
        }
        if fan_in < 2 {
            return Err(SortError::InvalidFanIn(fan_in));
        }

        return Ok(BalancedSorter {
            heap_size,
            fan_in,
            tmp_dir: tmp_path.map(Into::into),
            rw_buf_size,
            format,
        });
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    fn init_tmp_directory<S: Error, D: Error>(&self) -> Result<tempfile::TempDir, SortError<S, D>> {
        let tmp_dir = if let Some(tmp_path) = &self.tmp_dir {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Generates the run file of `input`.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    pub fn create_runs<T>(&self, input: &Path) -> Result<RunsReport, FormatError<T, R>>
    where
        T: Ord + Clone,
        R: RecordFormat<T>,
    {
        self.create_runs_by(input, T::cmp)
    }

    /// Generates the run file of `input` using a custom compare function.
    /// The output is written next to the input, with the `.runs` extension appended.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    /// * `compare` - Function to be used to compare records
    pub fn create_runs_by<T, F>(&self, input: &Path, compare: F) -> Result<RunsReport, FormatError<T, R>>
    where
        T: Clone,
        F: Fn(&T, &T) -> Ordering + Copy,
        R: RecordFormat<T>,
    {
        let output = append_extension(input, RUNS_EXTENSION);
        log::info!("generating runs of {} (heap size: {})", input.display(), self.heap_size);

        let reader = stream::open_reader(input, self.format.clone(), self.rw_buf_size).map_err(SortError::IO)?;
        let mut writer =
            stream::create_writer(&output, self.format.clone(), self.rw_buf_size).map_err(SortError::IO)?;

        let mut generator = RunGenerator::new(reader, self.heap_size, compare);
        for item in generator.by_ref() {
            let item = item.map_err(SortError::DeserializationError)?;
            writer.write(&item).map_err(SortError::SerializationError)?;
        }
        writer.flush().map_err(SortError::IO)?;

        log::info!("total runs: {}", generator.runs());

        return Ok(RunsReport {
            path: output,
            runs: generator.runs(),
            records: generator.records(),
        });
    }

    /// Merges the run file `input` into a sorted file.
    ///
    /// # Arguments
    /// * `input` - Run file, its name must end with `.runs`
    pub fn merge_runs<T>(&self, input: &Path) -> Result<MergeReport, FormatError<T, R>>
    where
        T: Ord,
        R: RecordFormat<T>,
    {
        self.merge_runs_by(input, T::cmp)
    }

    /// Merges the run file `input` into a sorted file using a custom compare function.
    /// The output is written next to the input, with the `.runs` extension replaced by `.sorted`.
    ///
    /// # Arguments
    /// * `input` - Run file, its name must end with `.runs`
    /// * `compare` - Function to be used to compare records
    pub fn merge_runs_by<T, F>(&self, input: &Path, compare: F) -> Result<MergeReport, FormatError<T, R>>
    where
        F: Fn(&T, &T) -> Ordering + Copy,
        R: RecordFormat<T>,
    {
        let output = sorted_path(input)?;
        log::info!("merging runs of {} (fan-in: {})", input.display(), self.fan_in);

        let reader = stream::open_reader(input, self.format.clone(), self.rw_buf_size).map_err(SortError::IO)?;

        let tmp_dir = self.init_tmp_directory()?;
        let mut sets = FileSets::new(
            self.create_scratch_files(tmp_dir.path())?,
            self.create_scratch_files(tmp_dir.path())?,
        );

        let runs = distribute(reader, sets.roles().0, compare, self.format.clone(), self.rw_buf_size)?;

        let scheduler = MergeScheduler {
            k: self.fan_in,
            compare,
            format: &self.format,
            rw_buf_size: self.rw_buf_size,
            item_type: std::marker::PhantomData,
        };
        let (passes, rounds) = scheduler.run(&mut sets)?;

        export(sets, &output)?;
        log::info!("total passes: {}", passes);

        return Ok(MergeReport {
            path: output,
            runs,
            passes,
            rounds,
        });
    }

    /// Sorts `input` running both phases. The run file is removed once merged.
    pub fn sort_file<T>(&self, input: &Path) -> Result<MergeReport, FormatError<T, R>>
    where
        T: Ord + Clone,
        R: RecordFormat<T>,
    {
        self.sort_file_by(input, T::cmp)
    }

    /// Sorts `input` running both phases using a custom compare function.
    /// The result is written to `<input>.sorted`.
    pub fn sort_file_by<T, F>(&self, input: &Path, compare: F) -> Result<MergeReport, FormatError<T, R>>
    where
        T: Clone,
        F: Fn(&T, &T) -> Ordering + Copy,
        R: RecordFormat<T>,
    {
        let runs = self.create_runs_by(input, compare)?;
        let report = self.merge_runs_by(&runs.path, compare)?;
        fs::remove_file(&runs.path).map_err(SortError::IO)?;

        return Ok(report);
    }

    fn create_scratch_files<S: Error, D: Error>(&self, dir: &Path) -> Result<Vec<ScratchFile>, SortError<S, D>> {
        let mut files = Vec::with_capacity(self.fan_in);
        for _ in 0..self.fan_in {
            files.push(ScratchFile::new_in(dir).map_err(SortError::TempDir)?);
        }
        return Ok(files);
    }
}

/// Moves the single remaining run to `dest`. No remaining run means empty input.
fn export<S: Error, D: Error>(sets: FileSets, dest: &Path) -> Result<(), SortError<S, D>> {
    let non_empty = sets.non_empty().map_err(SortError::IO)?;

    match non_empty.as_slice() {
        [] => {
            fs::File::create(dest).map_err(SortError::IO)?;
        }
        [(set_idx, 0)] => {
            let (set_idx, slot) = (*set_idx, 0);
            let file = sets
                .take(set_idx, slot)
                .ok_or(SortError::InternalConsistency("sorted file not found"))?;
            file.persist(dest).map_err(SortError::IO)?;
        }
        _ => return Err(SortError::InternalConsistency("sorted file not found")),
    }

    log::debug!("sorted data saved to {}", dest.display());

    return Ok(());
}

/// `<path>.<extension>`, keeping any extension `path` already has.
fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// `<name>.sorted` for a `<name>.runs` run file. A file named just `.runs` maps to `.sorted`.
fn sorted_path<S: Error, D: Error>(input: &Path) -> Result<PathBuf, SortError<S, D>> {
    let bare_runs = format!(".{}", RUNS_EXTENSION);

    match (input.file_name(), input.extension()) {
        (_, Some(extension)) if extension == RUNS_EXTENSION => Ok(input.with_extension(SORTED_EXTENSION)),
        (Some(name), None) if name == bare_runs.as_str() => {
            Ok(input.with_file_name(format!(".{}", SORTED_EXTENSION)))
        }
        _ => Err(SortError::InvalidExtension(input.to_path_buf())),
    }
}
