fn main() {
    if let Err(e) = koan_cli::run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
