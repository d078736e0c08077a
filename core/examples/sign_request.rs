//! Sign a request offline and print what would go on the wire.
//!
//! Run with: cargo run --example sign_request

use cloudreq_core::{Credentials, RequestOptions, RequestSigner, Result, SigningScheme};
use http::Method;
use serde_json::json;

fn main() -> Result<()> {
    let credentials = Credentials::new("AKIDEXAMPLE", "demo-secret-key").with_region("eu-de");
    let signer = RequestSigner::new(SigningScheme::Sdk);

    let mut req = RequestOptions::new()
        .with_method(Method::POST)
        .with_url("https://ecs.eu-de.example.com/v1/cloudservers")
        .with_header("Content-Type", "application/json")
        .with_json(json!({"server": {"name": "demo"}}))
        .normalize()?;
    signer.sign(&mut req, &credentials)?;

    println!("{} {}", req.method, req.resolved_url()?);
    for (name, value) in req.headers.iter() {
        println!("{name}: {}", value.to_str().unwrap_or("<opaque>"));
    }
    Ok(())
}
