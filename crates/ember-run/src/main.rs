use clap::Parser;

fn main() -> miette::Result<()> {
    ember_run::Cli::parse().run()
}
