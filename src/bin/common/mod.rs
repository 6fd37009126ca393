use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

#[derive(Copy, Clone, clap::ArgEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

pub fn log_level_arg() -> clap::Arg<'static> {
    clap::Arg::new("log_level")
        .short('l')
        .long("loglevel")
        .help("logging level")
        .takes_value(true)
        .default_value("info")
        .possible_values(LogLevel::possible_values())
}

pub fn rw_buf_size_arg() -> clap::Arg<'static> {
    clap::Arg::new("rw_buf_size")
        .short('b')
        .long("rw-buf-size")
        .help("file read/write buffer size")
        .takes_value(true)
        .validator(|v| match v.parse::<ByteSize>() {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Buffer size format incorrect: {}", err)),
        })
}

pub fn count_arg(name: &'static str, help: &'static str) -> clap::Arg<'static> {
    clap::Arg::new(name)
        .help(help)
        .required(true)
        .takes_value(true)
        .validator(|v| match v.parse::<usize>() {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("integer expected: {}", err)),
        })
}

pub fn rw_buf_size(arg_parser: &clap::ArgMatches) -> Option<usize> {
    arg_parser
        .value_of("rw_buf_size")
        .map(|v| v.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize)
}

pub fn init_logger(arg_parser: &clap::ArgMatches) {
    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");

    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
