// The bin only starts the terminal session; everything else lives in the lib.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lumina_lib::run().await
}
