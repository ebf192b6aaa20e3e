fn main() -> Result<(), Box<dyn std::error::Error>> {
    astrid::cli::main()
}
