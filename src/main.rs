use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    chatline::run().await
}
