mod cli;
mod error;
mod eventloop;
mod pool;
mod reader;
mod scheduler;
mod sink;

use error::CliMain;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .init();
}

fn run() -> Result<(), error::CliError> {
    let args: Vec<String> = std::env::args().collect();
    let parsed = cli::parse(args)?;
    init_logging(parsed.verbosity());
    let config = parsed.into_config()?;

    sink::ignore_sigpipe();
    let mut sinks = sink::open_sinks(&config.files)?;

    eventloop::run(&config, &mut sinks)
}

fn main() -> CliMain {
    run().into()
}
