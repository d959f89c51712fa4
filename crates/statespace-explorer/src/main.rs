mod cli;

use anyhow::Result;
use statespace_core::NodeId;
use statespace_explorer::graph::{ExpandOutcome, StopReason};
use statespace_explorer::net::{spawn_overview_link, HttpBackend, LinkEventKind};
use statespace_explorer::session::{Session, SessionOptions};
use statespace_explorer::util::config;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // stdout carries the pane summary
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let args = cli::parse_args()?;
    let mut cfg = match &args.config {
        Some(path) => config::load_or_default_from_path(path),
        None => config::load_or_default(),
    };
    args.apply(&mut cfg);
    if args.save_config {
        config::save(&cfg)?;
    }

    let backend = HttpBackend::new(&cfg.backend_base(), cfg.request_timeout())?;
    tracing::info!(backend = %backend.base_url(), "using backend");
    let mut session = Session::init(Arc::new(backend), SessionOptions::from(&cfg));
    let link = args
        .overview
        .then(|| spawn_overview_link(cfg.overview_socket_path(), session.bus()));

    let primary = match &args.import {
        Some(path) => {
            session.import_from(path)?;
            session.primary()?
        }
        None => session.start().await?,
    };
    if args.policy.is_some() {
        session.set_policy(&primary, args.policy.clone())?;
    }

    let requested: Vec<NodeId> = args.expand.iter().map(|id| NodeId::from(id.as_str())).collect();
    if !requested.is_empty() {
        if let ExpandOutcome::CapacityExceeded(pending) = session.expand(&primary, &requested).await? {
            let resolution = session.resolve_capacity(&primary, pending, args.on_capacity)?;
            tracing::info!(?resolution, "expansion over capacity resolved");
        }
    }

    if let Some(steps) = args.best_path {
        let sources = if requested.is_empty() {
            session.select_initial(&primary)?
        } else {
            requested.clone()
        };
        let report = session.expand_best_path(&primary, &sources, Some(steps)).await?;
        tracing::info!(steps = report.steps, frontier = ?report.frontier, stop = ?report.stop, "best path");
        if let StopReason::Capacity(pending) = report.stop {
            let resolution = session.resolve_capacity(&primary, pending, args.on_capacity)?;
            tracing::info!(?resolution, "best path over capacity resolved");
        }
    }

    if !args.mark.is_empty() {
        let ids: Vec<NodeId> = args.mark.iter().map(|id| NodeId::from(id.as_str())).collect();
        session.mark(&ids);
    }
    if args.recurrence {
        session.detect_recurrence();
    }

    println!("{}", serde_json::to_string_pretty(&session.summary())?);

    if let Some(path) = &args.export {
        session.export_to(path, session.panes().ids(), false)?;
    }

    if let Some(link) = link {
        for event in link.events.try_iter() {
            match event.kind {
                LinkEventKind::Received(msg) => session.on_overview(msg)?,
                LinkEventKind::Error(e) => tracing::warn!(socket = %event.socket, error = %e, "overview link"),
                other => tracing::debug!(socket = %event.socket, kind = ?other, "overview link"),
            }
        }
        link.close();
    }
    session.teardown();
    Ok(())
}
