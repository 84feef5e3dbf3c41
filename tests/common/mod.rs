//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use policy_gateway::admin::{self, AdminState};
use policy_gateway::config::{parse_config, ListenerConfig};
use policy_gateway::observability::NullSink;
use policy_gateway::{Gateway, HttpServer, Shutdown};
use tokio::net::TcpListener;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Routes and policies as an operator would configure them from the console.
pub const CONSOLE_CONFIG: &str = r#"
[[issuers]]
name = "auth-server"
tokens = { "valid-token" = "alice", "other-token" = "bob" }

[[routes]]
id = "1"
path = "/api/payment/**"
method = "POST"
target = "lb://payment-service"

[[routes]]
id = "2"
path = "/api/order/**"
method = "ALL"
target = "lb://order-service"
condition = "region==EU"

[[routes]]
id = "3"
path = "/api/product/**"
method = "GET"
target = "lb://product-service"
enabled = false

[[routes]]
id = "4"
path = "/api/user/**"
method = "GET"
target = "lb://user-service"

[[routes]]
id = "5"
path = "/api/payment/checkout"
method = "POST"
target = "lb://checkout-service"

[[routes]]
id = "6"
path = "/public/*"
method = "GET"
target = "lb://static"

[[policies]]
id = "1"
name = "JWT auth"
type = "jwt"
path = "/api/**"
config = "issuer=auth-server"
priority = 1

[[policies]]
id = "2"
name = "Payment rate limit"
type = "ratelimit"
path = "/api/payment/**"
config = "3req/h"
priority = 2

[[policies]]
id = "3"
name = "SQL injection filter"
type = "waf"
path = "/**"
config = "block-sql-injection;block-xss"
priority = 3

[[policies]]
id = "4"
name = "Open CORS"
type = "cors"
path = "/**"
config = "allow-origin=*"
priority = 4
"#;

/// One broad route with a narrower auth scope inside it.
pub const SCOPED_ADMIN_CONFIG: &str = r#"
[[issuers]]
name = "auth-server"
tokens = { "valid-token" = "alice" }

[[routes]]
id = "api"
path = "/api/**"
method = "ALL"
target = "lb://api"

[[policies]]
id = "admin-auth"
type = "jwt"
path = "/api/admin/**"
config = "issuer=auth-server"
"#;

/// Build a gateway from TOML, discarding dispatch records.
pub fn gateway_from_toml(toml: &str) -> Arc<Gateway> {
    let config = parse_config(toml).expect("test config must be valid");
    Arc::new(Gateway::from_config(&config, Arc::new(NullSink)).expect("test config must compile"))
}

pub fn console_gateway() -> Arc<Gateway> {
    gateway_from_toml(CONSOLE_CONFIG)
}

/// Start the decision server on an ephemeral port.
pub async fn start_decision_server(gateway: Arc<Gateway>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(gateway, &ListenerConfig::default());
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    wait_until_listening(addr).await;
    (addr, shutdown)
}

/// Start the admin API on an ephemeral port.
pub async fn start_admin_server(gateway: Arc<Gateway>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let state = AdminState::new(gateway, ADMIN_KEY);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = admin::serve(listener, state, server_shutdown).await;
    });

    wait_until_listening(addr).await;
    (addr, shutdown)
}

/// Send a request line verbatim, bypassing client-side URL normalization,
/// and return the response status code.
pub async fn raw_status(addr: SocketAddr, method: &str, target: &str) -> u16 {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let head = format!("{method} {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("response has a status line")
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server at {addr} never started listening");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
