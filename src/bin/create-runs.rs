use std::path;
use std::process;

use log;

use kway_sort::{BalancedSorter, BalancedSorterBuilder};

mod common;

fn main() {
    let arg_parser = build_arg_parser();
    common::init_logger(&arg_parser);

    let heap_size: usize = arg_parser.value_of_t_or_exit("heap_size");
    let input = arg_parser.value_of("input").expect("value is required");

    let mut sorter_builder = BalancedSorterBuilder::new().with_heap_size(heap_size);
    if let Some(rw_buf_size) = common::rw_buf_size(&arg_parser) {
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
    }

    let sorter: BalancedSorter = match sorter_builder.build::<Vec<u8>>() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("run generator initialization error: {}", err);
            process::exit(1);
        }
    };

    match sorter.create_runs::<Vec<u8>>(path::Path::new(input)) {
        Ok(report) => log::info!("runs saved to {}", report.path.display()),
        Err(err) => {
            log::error!("run generation error: {}", err);
            process::exit(1);
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("create-runs")
        .about("splits a file into sorted runs using replacement selection")
        .arg(common::count_arg("heap_size", "maximum number of lines held in memory"))
        .arg(
            clap::Arg::new("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(common::log_level_arg())
        .arg(common::rw_buf_size_arg())
        .get_matches()
}
