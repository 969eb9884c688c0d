use logforth::append;

use crate::args::Args;

pub fn init(args: &Args) {
    let level = args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    logforth::builder()
        .dispatch(|dispatch| dispatch.filter(level).append(append::Stderr::default()))
        .apply();
}
