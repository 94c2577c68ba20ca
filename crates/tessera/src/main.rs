use clap::Parser;

use crate::cli::App;

mod cli;
mod utils;

fn main() -> anyhow::Result<()> {
    let app = App::parse();
    utils::log::init(app.verbose);
    cli::run(app)
}
