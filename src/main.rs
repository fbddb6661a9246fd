//! ACME server entrypoint.
//!
//! This binary launches an Axum-based HTTP server that exposes the ACME
//! protocol interface described in RFC 8555: directory discovery, nonce
//! issuance, account registration, order creation and finalization,
//! authorization and challenge handling, certificate retrieval and
//! revocation, and the CA's asynchronous trigger callback.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `ACME_HOST`, `ACME_PORT` control the bind address
//! - `CONFIG` points at a JSON configuration file (default `config.json`)

use std::process;

use acme_server::run::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1);
    }
}
