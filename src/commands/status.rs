use clap::Args;
use serde::Serialize;

use airlift::providers::{ComputeApi, ComputeClient, EdgeApi, EdgeClient, Provider};
use airlift::secrets::{self, FsSecretStore};
use airlift::settings::{self, ComputeSettings, EdgeSettings};
use airlift::profile;

use super::CmdResult;

#[derive(Args)]
pub struct StatusArgs {
    /// Also verify stored credentials against the live providers
    #[arg(long)]
    pub live: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub command: String,
    pub active_profile: Option<String>,
    pub profiles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<EdgeSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_verified: Option<bool>,
}

pub fn run(args: StatusArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<StatusOutput> {
    let store = FsSecretStore::default_location()?;
    let user = secrets::current_user();

    let compute_verified = if args.live {
        secrets::load_token(&store, &user, Provider::Compute)?
            .map(|token| ComputeClient::from_env().verify_token(&token).is_ok())
    } else {
        None
    };
    let edge_verified = if args.live {
        secrets::load_token(&store, &user, Provider::Edge)?
            .map(|token| EdgeClient::from_env().verify_token(&token).is_ok())
    } else {
        None
    };

    Ok((
        StatusOutput {
            command: "status".to_string(),
            active_profile: profile::active_id()?,
            profiles: profile::list_ids()?,
            compute: settings::load_compute(&store, &user)?,
            edge: settings::load_edge(&store, &user)?,
            compute_verified,
            edge_verified,
        },
        0,
    ))
}
