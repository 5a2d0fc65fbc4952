mod cli;
mod config;
mod constants;
mod error;
mod events;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use padflow_engine::{
    EditorSession, Graph, GraphSnapshot, LocalTransport, SecretProvider,
    ServiceExtensions, StaticSecretProvider,
};
use tokio::io::BufReader;

use cli::Args;
use config::HostConfig;
use constants::{defaults, USAGE};
use error::{HostError, Result};
use events::{log_notes, LogEventSink};

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(defaults::LOG_FILTER))
        .format_timestamp_millis()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(HostError::Usage(message)) => {
            eprintln!("{}", message);
            ExitCode::from(2)
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = HostConfig::from_env().await?;
    let library = Arc::new(padflow_nodes::library());
    log::info!("Padflow starting with {} node types", library.node_types().len());

    let mut graph = Graph::new(library, config.engine.clone());
    if let Some(path) = &args.snapshot {
        let snapshot = read_snapshot(path).await?;
        graph.load_from_snapshot(&snapshot)?;
        log::info!("Loaded {} node(s) from {:?}", snapshot.nodes.len(), path);
    }
    log_notes(&graph.notes());

    if args.editor {
        edit(graph).await
    } else {
        execute(&graph, &config).await
    }
}

async fn read_snapshot(path: &Path) -> Result<GraphSnapshot> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| HostError::Snapshot {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_str(&contents).map_err(|source| HostError::MalformedSnapshot {
        path: path.display().to_string(),
        source,
    })
}

/// Serve the editor protocol until stdin closes
async fn edit(graph: Graph) -> Result<()> {
    log::info!("Serving editor requests on stdin");
    let mut session = EditorSession::new(graph);
    session
        .serve_json_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    log::info!("Editor closed");
    Ok(())
}

/// Run the graph until interrupted
async fn execute(graph: &Graph, config: &HostConfig) -> Result<()> {
    let transport = Arc::new(LocalTransport::new(config.transport_identity.clone()));

    let secrets = StaticSecretProvider::from_env(&config.secret_env_prefix);
    let secret_count = secrets.list_secrets().await?.len();
    if secret_count > 0 {
        log::info!("Exposing {} secret(s) to nodes", secret_count);
    }
    let services = ServiceExtensions::new().with_secrets(Arc::new(secrets));

    let runtime = graph.run(transport, services, Arc::new(LogEventSink))?;
    log::info!("Graph run {} started; press Ctrl-C to stop", runtime.run_id());

    tokio::signal::ctrl_c().await?;
    log::info!("Interrupted; stopping graph");
    runtime.shutdown().await;
    Ok(())
}
