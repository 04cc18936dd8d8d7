#![deny(unsafe_code)]
use anyhow::{Context, Result};
use chainrpc_transport::{InMemoryResolver, ServerState, TargetResolver, build_router};
use chainrpc_validate::ValidationLimits;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chainrpc-transport", version, about = "ChainRPC HTTP/WebSocket transport")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Route prefix segment, e.g. `__rpc` in `/__rpc/{binding}/{instance}/call`.
    #[arg(long, default_value_t = chainrpc_core::DEFAULT_PREFIX.to_string())]
    prefix: String,

    /// Maximum accepted chain depth.
    #[arg(long, default_value_t = chainrpc_core::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Maximum accepted argument count per `Apply` step.
    #[arg(long, default_value_t = chainrpc_core::DEFAULT_MAX_ARGS)]
    max_args: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("chainrpc=info"))
        .init();

    // Host-runtime bindings to a durable/stateful object registry are an
    // external collaborator this crate doesn't implement (spec Non-goals);
    // an embedding application registers its own targets on this resolver
    // (or supplies its own `TargetResolver` impl) before serving traffic.
    let resolver: Arc<dyn TargetResolver> = Arc::new(InMemoryResolver::new());
    let mut state = ServerState::new(resolver);
    state.route_config.prefix = args.prefix.clone();
    state.limits = ValidationLimits {
        max_depth: args.max_depth,
        max_args: args.max_args,
    };

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, prefix = %args.prefix, "chainrpc-transport listening");

    axum::serve(listener, app).await.context("serve")
}
