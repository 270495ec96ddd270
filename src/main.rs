fn main() {
    cycler_pipeline::cli::run();
}
