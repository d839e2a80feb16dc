fn main() {
    if let Err(err) = schemaport::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
