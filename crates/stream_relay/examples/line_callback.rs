//! Observes a command's stdout line-by-line through a caller callback.
//!
//! Usage:
//! - `cargo run -p stream_relay --example line_callback`

use std::error::Error;

use stream_relay::RelayCommand;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut count = 0usize;
    let result = RelayCommand::new("sh")
        .arg("-c")
        .arg("printf 'first\\nsecond\\nunterminated'")
        .on_output_line(move |line| {
            count += 1;
            print!("line {count}: {line}");
            Ok(())
        })
        .capture_stdout()
        .execute()
        .await?;

    // Without console mirroring the relay is line-buffered, so the trailing
    // fragment still reaches the callback as a final line.
    println!("captured: {:?}", result.stdout);
    Ok(())
}
