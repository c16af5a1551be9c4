//! Gateway CLI.
//!
//! Registers every configured API on an in-memory transport, lists the
//! resulting events and optionally emits one of them.
//!
//! # Usage
//!
//! ```bash
//! hazel-gateway <config.json> [event] [payload-json]
//! ```
//!
//! The config path falls back to `HAZEL_CONFIG`; `HAZEL_LOG` overrides the
//! log filter. Both can come from a `.env` file.
//!
//! # Example
//!
//! ```bash
//! hazel-gateway gateway.json "users.GET /0/user/:id" '{"params":{"id":7}}'
//! ```

use example::{AppConfig, call, config_path, start};
use hazel_system::transport::{MemoryTransport, Transport};
use serde_json::Value;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = config_path(args.get(1).map(String::as_str)) else {
        eprintln!("Usage: <config.json> [event] [payload-json]");
        eprintln!("Example: gateway.json \"users./ping\" '{{}}'");
        std::process::exit(1);
    };

    let config = AppConfig::from_file(&path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let transport = MemoryTransport::new();
    let (mut server, result) = start(config, &transport).await;
    if let Err(e) = result {
        eprintln!("Warning: {e}");
    }

    for key in transport.event_keys() {
        eprintln!("  {key}");
    }

    if let Some(key) = args.get(2) {
        let payload = match args.get(3) {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                eprintln!("Error: invalid payload: {e}");
                std::process::exit(1);
            }),
            None => Value::Null,
        };

        match call(&transport, key, payload).await {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    server.stop();
}

#[expect(clippy::print_stdout, reason = "the response is the program's output")]
fn print_response(response: &Value) {
    let pretty = serde_json::to_string_pretty(response).unwrap_or_default();
    println!("{pretty}");
}
