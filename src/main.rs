fn main() {
    impression_pipeline::cli::run();
}
