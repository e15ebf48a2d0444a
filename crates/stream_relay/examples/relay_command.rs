//! Runs a command while mirroring its output to the console and capturing a
//! normalized transcript.
//!
//! Usage:
//! - `cargo run -p stream_relay --example relay_command`

use std::error::Error;

use stream_relay::RelayCommand;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let result = RelayCommand::new("ls")
        .arg("-la")
        .forward_stdout()
        .forward_stderr()
        .capture_stdout()
        .execute()
        .await?;

    println!("exit: {}", result.status);
    println!(
        "captured stdout chars: {}",
        result.stdout.map(|s| s.chars().count()).unwrap_or(0)
    );
    Ok(())
}
