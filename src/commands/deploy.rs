use clap::{Args, ValueEnum};
use serde::Serialize;
use std::time::Duration;

use airlift::orchestrator::{DeployOptions, DeployOutcome, Workflow};
use airlift::progress::{Emitter, JsonLinesEmitter, TextEmitter};
use airlift::prompt::DirectIoPrompter;

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Profile ID (defaults to the active profile)
    #[arg(long)]
    pub profile: Option<String>,

    /// App name override
    #[arg(long)]
    pub app: Option<String>,

    /// Organization override
    #[arg(long)]
    pub organization: Option<String>,

    /// Region override
    #[arg(long)]
    pub region: Option<String>,

    /// Registry host override
    #[arg(long)]
    pub registry: Option<String>,

    /// Full repository coordinate override
    #[arg(long)]
    pub repository: Option<String>,

    /// Image tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Overall workflow timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Accept optional-capability warnings without asking
    #[arg(long)]
    pub yes: bool,

    /// Edge: mint a scoped token from an elevated credential
    #[arg(long)]
    pub edge_bootstrap: bool,

    /// Progress rendering on stderr
    #[arg(long, value_enum, default_value = "text")]
    pub progress: ProgressFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProgressFormat {
    /// Human-readable phase lines
    Text,
    /// One JSON event per line
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub command: String,
    #[serde(flatten)]
    pub outcome: DeployOutcome,
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployOutput> {
    let workflow = Workflow::from_environment()?;

    let options = DeployOptions {
        profile: args.profile,
        app: args.app,
        organization: args.organization,
        region: args.region,
        registry: args.registry,
        repository: args.repository,
        tags: args.tags,
        timeout: args.timeout.map(Duration::from_secs),
        auto_accept_warnings: args.yes,
        edge_bootstrap: args.edge_bootstrap,
    };

    let emitter: Box<dyn Emitter> = match args.progress {
        ProgressFormat::Text => Box::new(TextEmitter::stderr()),
        ProgressFormat::Json => Box::new(JsonLinesEmitter::stderr()),
    };
    let prompter = DirectIoPrompter::stdio();

    let outcome = workflow.deploy(&options, &*emitter, &prompter)?;

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            outcome,
        },
        0,
    ))
}
