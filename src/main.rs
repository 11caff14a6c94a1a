//! OTLP receiver entry point.

use otlp_receiver::cli::{self, Cli};
use otlp_receiver::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
