use std::path;
use std::process;

use log;

use kway_sort::{BalancedSorter, BalancedSorterBuilder};

mod common;

fn main() {
    let arg_parser = build_arg_parser();
    common::init_logger(&arg_parser);

    let fan_in: usize = arg_parser.value_of_t_or_exit("k");
    let input = arg_parser.value_of("input").expect("value is required");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");

    let mut sorter_builder = BalancedSorterBuilder::new().with_fan_in(fan_in);
    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }
    if let Some(rw_buf_size) = common::rw_buf_size(&arg_parser) {
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
    }

    let sorter: BalancedSorter = match sorter_builder.build::<Vec<u8>>() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("merger initialization error: {}", err);
            process::exit(1);
        }
    };

    match sorter.merge_runs::<Vec<u8>>(path::Path::new(input)) {
        Ok(report) => log::info!("sorted data saved to {}", report.path.display()),
        Err(err) => {
            log::error!("merge error: {}", err);
            process::exit(1);
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("merge-runs")
        .about("merges a run file into a sorted file with a balanced k-way merge")
        .arg(common::count_arg("k", "number of runs merged at once"))
        .arg(
            clap::Arg::new("input")
                .help("run file (.runs) to be merged")
                .required(true)
                .takes_value(true),
        )
        .arg(common::log_level_arg())
        .arg(common::rw_buf_size_arg())
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}
