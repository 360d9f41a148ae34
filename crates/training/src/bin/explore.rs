use clap::Parser;
use training::util::{run_explore, ExploreArgs};

fn main() -> anyhow::Result<()> {
    let args = ExploreArgs::parse();
    run_explore(args)
}
