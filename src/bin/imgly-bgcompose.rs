//! IMG.LY Background Compositing CLI Tool
//!
//! Command-line interface for compositing background-removed photos with
//! fills, blur, grayscale and outline effects.

#[cfg(feature = "cli")]
use imgly_bgcompose::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
