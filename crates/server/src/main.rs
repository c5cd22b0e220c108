#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docrag_server::start().await
}
