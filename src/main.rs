#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = picrete_proctor::run().await {
        eprintln!("picrete-proctor fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
