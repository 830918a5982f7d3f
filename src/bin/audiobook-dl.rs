//! audiobook-dl CLI - download audiobooks chapter by chapter.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match audiobook_dl::cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
