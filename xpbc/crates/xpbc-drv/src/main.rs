fn main() {
    let argv = std::env::args().skip(1);
    std::process::exit(xpbc_drv::run(argv));
}
