//! Pythia entry point.

fn main() {
    std::process::exit(pythia::cli::run_cli());
}
