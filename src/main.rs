use regsync::cli::{Args, Runner};
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    let runner = match Runner::new(args) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = runner.run().await {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}
