#[tokio::main]
async fn main() -> anyhow::Result<()> {
    issue_digest::cli::run().await
}
