use retry_http::{ErrorKind, ExponentialRetry, RetryClient, RetryOptions, StatusCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/503".to_owned());

    let client = RetryClient::new()
        .with_strategy(ExponentialRetry::new(0.2, 5.0, 2.0)?)
        .with_options(
            RetryOptions::new(4)
                .with_statuses([StatusCode::TOO_MANY_REQUESTS, StatusCode::SERVICE_UNAVAILABLE])
                .with_exceptions([ErrorKind::Connect, ErrorKind::Timeout]),
        );

    let response = client.get(&url).await?;
    println!("{url} -> {}", response.status());
    println!("{}", response.text().await?);

    client.close();
    Ok(())
}
