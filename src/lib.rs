//! `kway-sort` is a balanced k-way sort-merge implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! Sorting is done in two phases:
//!
//! * **Run generation:**
//!   replacement selection over a bounded min-heap reorders the input into ascending runs. For random input
//!   runs are about twice as long as the heap. Runs are written back to back, a run ends wherever the next
//!   record is smaller than the previous one, so no markers are needed.
//! * **Balanced merging:**
//!   runs are distributed over `k` scratch files, then merged `k` at a time into a second set of `k` scratch
//!   files. The two sets swap roles every round until a single run, the sorted data, remains. Only `O(k)` files
//!   are open at any time regardless of the number of runs.
//!
//! Records are newline-delimited text by default. Any other format can be plugged in by implementing
//! [`RecordFormat`], a `MessagePack` format for `serde` types is provided.
//!
//! # Example
//!
//! ```no_run
//! use std::path;
//!
//! use kway_sort::BalancedSorterBuilder;
//!
//! fn main() {
//!     let sorter = BalancedSorterBuilder::new()
//!         .with_heap_size(100_000)
//!         .with_fan_in(16)
//!         .with_tmp_dir(path::Path::new("./"))
//!         .build::<String>()
//!         .unwrap();
//!
//!     let runs = sorter.create_runs::<String>(path::Path::new("input.txt")).unwrap();
//!     let merged = sorter.merge_runs::<String>(&runs.path).unwrap();
//!
//!     println!("{} runs merged in {} passes", merged.runs, merged.passes);
//! }
//! ```

pub mod distribute;
pub mod format;
pub mod heap;
pub mod merger;
pub mod runs;
pub mod sort;
pub mod stream;

pub use format::{LineFormat, RecordFormat, RecordReader, RecordWriter, RmpFormat};
pub use heap::{BoundedHeap, Compare};
pub use merger::{KWayMerger, MergeNode};
pub use runs::RunGenerator;
pub use sort::{BalancedSorter, BalancedSorterBuilder, MergeReport, RunsReport, SortError};
pub use stream::ScratchFile;
