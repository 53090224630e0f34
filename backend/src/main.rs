#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fridge_server::start_server().await
}
