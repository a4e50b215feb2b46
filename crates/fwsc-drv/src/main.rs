fn main() {
    if let Err(e) = fwsc_drv::main() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
