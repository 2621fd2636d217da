fn main() -> Result<(), Box<dyn std::error::Error>> {
    autoclick_lib::cli::run()
}
