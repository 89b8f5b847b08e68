fn main() {
    smlang::cli::run();
}
