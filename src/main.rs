fn main() -> std::process::ExitCode {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    screenrec_lib::run()
}
