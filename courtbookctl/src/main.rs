use clap::Parser;

fn main() {
    let cli = courtbookctl::Cli::parse();
    courtbookctl::init_tracing(cli.verbose);
    if let Err(err) = courtbookctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
