#[tokio::main]
async fn main() {
    if let Err(error) = qr_connect::run().await {
        eprintln!("fatal: {error}");
        std::process::exit(1);
    }
}
