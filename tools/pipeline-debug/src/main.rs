//! Pipeline Debug Tool
//!
//! Inspects blend strings and the copy-on-write pipeline trees built from
//! them.
//!
//! # Usage
//!
//! ```bash
//! # Compile a blend string
//! pipeline-debug compile "RGBA = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))"
//!
//! # Graph two pipelines derived from one base, rendered with Graphviz
//! pipeline-debug graph "RGBA = ADD(SRC_COLOR, 0)" "RGBA = ADD(SRC_COLOR, DST_COLOR)" | dot -Tsvg
//!
//! # Use a reduced capability set
//! pipeline-debug --caps gles2.toml compile "RGBA = ADD(SRC_COLOR*(CONSTANT), 0)"
//! ```
//!
//! Set `RUST_LOG=debug` to see copy-on-write and reparenting decisions.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use nether_pipeline::{
    BlendState, Capabilities, Color, LayerState, PipelineState, PipelineStore,
};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let caps = match &cli.caps {
        Some(path) => Capabilities::load(path)
            .with_context(|| format!("Failed to load capabilities from {}", path.display()))?,
        None => Capabilities::default(),
    };

    match cli.command {
        Commands::Compile { blend } => compile(&caps, &blend),
        Commands::Graph {
            blends,
            alpha,
            verbose,
        } => graph(caps, &blends, alpha, verbose),
    }
}

fn compile(caps: &Capabilities, blend: &str) -> Result<()> {
    let statements = nether_blend::compile(&caps.blend(), blend)
        .with_context(|| format!("Failed to compile {blend:?}"))?;

    for (i, statement) in statements.as_slice().iter().enumerate() {
        println!("statement {i}: {statement:#?}");
    }

    let (rgb, alpha) = statements.rgb_alpha();
    let state = BlendState::from_statements(rgb, alpha, Color::TRANSPARENT);
    println!("blend state: {state:#?}");
    Ok(())
}

fn graph(caps: Capabilities, blends: &[String], alpha: f32, verbose: bool) -> Result<()> {
    let mut store = PipelineStore::new(caps);
    let mut base = store.new_pipeline();
    store.set_label(&mut base, "base");
    store.set_color(&mut base, Color::new(1.0, 1.0, 1.0, alpha));

    let mut derived = Vec::with_capacity(blends.len());
    for (i, blend) in blends.iter().enumerate() {
        let mut pipeline = store.copy(&base);
        store.set_label(&mut pipeline, &format!("blend {i}"));
        let result = store.set_blend(&mut pipeline, blend);
        if let Err(e) = result {
            store.release(pipeline);
            store.release(base);
            for pipeline in derived {
                store.release(pipeline);
            }
            return Err(e).with_context(|| format!("Failed to apply {blend:?}"));
        }
        derived.push(pipeline);
    }

    if verbose {
        let groups = PipelineState::ALL_SPARSE | PipelineState::REAL_BLEND_ENABLE;
        for (i, pipeline) in derived.iter().enumerate() {
            eprintln!(
                "blend {i}: node {:?}, blending {}, hash {:016x}",
                pipeline.node(),
                store.real_blend_enable(pipeline.node()),
                store.hash(pipeline.node(), groups, LayerState::ALL_SPARSE)
            );
        }
    }

    print!("{}", store.graph());

    for pipeline in derived {
        store.release(pipeline);
    }
    store.release(base);
    tracing::debug!("{} nodes left after release", store.node_count());
    Ok(())
}
