fn main() {
    if let Err(err) = appfence::run() {
        eprintln!("appfence failed: {err:#}");
        std::process::exit(1);
    }
}
