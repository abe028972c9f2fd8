use clap::Parser;
use log::{info, warn};
use snafu::ErrorCompat;

mod args;
mod dashboard;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    info!("args: {:?}", args);

    let res = dashboard::run_dashboard(
        args.config.clone(),
        args.reference.clone(),
        args.out.clone(),
        args.realtime,
    );

    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
