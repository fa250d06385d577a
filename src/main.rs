fn main() {
    use clap::Parser;
    let args = cnovel::cli::Args::parse();
    if let Err(e) = cnovel::cli::run(&args) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
