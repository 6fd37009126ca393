//! Run distributor.

use std::cmp::Ordering;

use log;

use crate::format::RecordFormat;
use crate::sort::SortError;
use crate::stream::ScratchFile;

/// Spreads a run concatenation over `files`, one run per file in round-robin order.
/// Returns the number of runs seen.
///
/// A run boundary is any item not greater than its predecessor, so no markers are needed in the stream.
/// Equal adjacent items are split into separate runs, which keeps every run strictly ascending.
///
/// # Arguments
/// * `runs` - Run concatenation, e.g. the output of [`RunGenerator`](crate::runs::RunGenerator)
/// * `files` - Scratch files the runs are appended to
/// * `compare` - Function to be used to compare items
/// * `format` - Scratch file record format
/// * `rw_buf_size` - Scratch file write buffer size
pub fn distribute<T, I, F, R>(
    runs: I,
    files: &[ScratchFile],
    compare: F,
    format: R,
    rw_buf_size: Option<usize>,
) -> Result<usize, SortError<R::SerializationError, R::DeserializationError>>
where
    I: IntoIterator<Item = Result<T, R::DeserializationError>>,
    F: Fn(&T, &T) -> Ordering,
    R: RecordFormat<T>,
{
    let mut writers = Vec::with_capacity(files.len());
    for file in files {
        writers.push(file.appender(format.clone(), rw_buf_size).map_err(SortError::IO)?);
    }
    if writers.is_empty() {
        return Err(SortError::InvalidFanIn(0));
    }

    let mut dest = 0;
    let mut run_count = 0;
    let mut previous: Option<T> = None;

    for item in runs {
        let item = item.map_err(SortError::DeserializationError)?;

        match &previous {
            Some(previous) if compare(&item, previous) != Ordering::Greater => {
                dest = (dest + 1) % writers.len();
                run_count += 1;
            }
            Some(_) => {}
            None => run_count += 1,
        }

        writers[dest].write(&item).map_err(SortError::SerializationError)?;
        previous = Some(item);
    }

    for writer in writers.iter_mut() {
        writer.flush().map_err(SortError::IO)?;
    }

    log::debug!("{} runs distributed over {} files", run_count, files.len());

    return Ok(run_count);
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::distribute;
    use crate::format::LineFormat;
    use crate::stream::ScratchFile;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn read_lines(file: &ScratchFile) -> Vec<String> {
        let lines: Result<Vec<String>, io::Error> = file.reader(LineFormat, None).unwrap().collect();
        lines.unwrap()
    }

    #[rstest]
    #[case(vec![], 2, 0, vec![vec![], vec![]])]
    #[case(vec!["1", "4", "7", "2", "3", "9"], 2, 2, vec![vec!["1", "4", "7"], vec!["2", "3", "9"]])]
    #[case(vec!["1", "1", "2", "0", "5", "3"], 2, 4, vec![vec!["1", "0", "5"], vec!["1", "2", "3"]])]
    #[case(vec!["a", "a", "b"], 2, 2, vec![vec!["a"], vec!["a", "b"]])]
    #[case(vec!["c", "b", "a"], 3, 3, vec![vec!["c"], vec!["b"], vec!["a"]])]
    #[case(vec!["a", "b", "c"], 3, 1, vec![vec!["a", "b", "c"], vec![], vec![]])]
    fn test_distribute(
        tmp_dir: tempfile::TempDir,
        #[case] input: Vec<&str>,
        #[case] k: usize,
        #[case] expected_runs: usize,
        #[case] expected_files: Vec<Vec<&str>>,
    ) {
        let files: Vec<ScratchFile> = (0..k).map(|_| ScratchFile::new_in(tmp_dir.path()).unwrap()).collect();
        let runs = input.into_iter().map(|item| Ok(item.to_string()));

        let run_count = distribute(runs, &files, String::cmp, LineFormat, None).unwrap();

        assert_eq!(run_count, expected_runs);
        let actual_files: Vec<Vec<String>> = files.iter().map(read_lines).collect();
        assert_eq!(actual_files, expected_files);
    }
}
