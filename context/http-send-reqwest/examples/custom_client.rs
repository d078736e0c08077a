use std::time::Duration;

use anyhow::Result;
use cloudreq_core::{ClientConfig, HttpClient, RequestOptions};
use cloudreq_http_send_reqwest::ReqwestHttpSend;
use reqwest::Client;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    // Create a custom reqwest client with specific configuration
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .user_agent("cloudreq-example/1.0")
        .build()?;

    println!("Created custom HTTP client with:");
    println!("  - 30 second timeout");
    println!("  - Max 10 idle connections per host");
    println!("  - Custom user agent");

    // Drive it through the request pipeline.
    let http = HttpClient::new(
        ClientConfig::new().with_base_url("https://httpbin.org"),
        ReqwestHttpSend::new(client),
    );

    println!("\nGET https://httpbin.org/get");
    let resp = http
        .get(RequestOptions::new().with_url("/get").with_param("demo", "1"))
        .await?;
    println!("Response status: {}", resp.status);
    println!("Response body:\n{:#}", resp.data);

    // The default client works without any setup.
    println!("\n--- Using default client ---");
    let http = HttpClient::new(
        ClientConfig::new().with_base_url("https://httpbin.org"),
        ReqwestHttpSend::default(),
    );

    let resp = http
        .post(
            RequestOptions::new()
                .with_url("/post")
                .with_json(json!({"message": "Hello from cloudreq!"})),
        )
        .await?;
    println!("POST request successful!");
    println!("Response status: {}", resp.status);

    Ok(())
}
