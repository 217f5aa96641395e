#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lexiread_backend::run().await
}
