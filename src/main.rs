fn main() {
    if let Err(err) = vendista_monitor::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
