use imgcopy::cli::{Args, Runner};

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    let runner = Runner::new(args);
    if let Err(err) = runner.run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
