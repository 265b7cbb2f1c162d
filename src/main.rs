#[tokio::main]
async fn main() {
    bazaar::start_server().await;
}
