use clap::{Args, Subcommand};
use serde::Serialize;

use airlift::profile::{self, Profile};

use super::{read_json_spec, CmdResult};

#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    command: ProfileCommand,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// List configured profiles
    List,

    /// Show a profile (active profile when no id is given)
    Show {
        /// Profile ID
        id: Option<String>,
    },

    /// Create or update a profile from a JSON spec
    Set {
        /// Profile ID
        id: String,

        /// JSON spec (inline or @file)
        spec: String,
    },

    /// Select the active profile
    Use {
        /// Profile ID
        id: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ProfileOutput {
    #[serde(rename_all = "camelCase")]
    List {
        profiles: Vec<String>,
        active: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Show { id: String, profile: Profile },
    #[serde(rename_all = "camelCase")]
    Set { id: String, profile: Profile },
    #[serde(rename_all = "camelCase")]
    Use { id: String },
}

pub fn run(args: ProfileArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ProfileOutput> {
    match args.command {
        ProfileCommand::List => Ok((
            ProfileOutput::List {
                profiles: profile::list_ids()?,
                active: profile::active_id()?,
            },
            0,
        )),
        ProfileCommand::Show { id } => {
            let id = match id {
                Some(id) => id,
                None => profile::active_id()?.ok_or_else(airlift::Error::profile_no_active)?,
            };
            let loaded = profile::load(&id)?;
            Ok((ProfileOutput::Show { id, profile: loaded }, 0))
        }
        ProfileCommand::Set { id, spec } => {
            let patch = read_json_spec(&spec)?;
            let updated = profile::merge(&id, &patch)?;
            Ok((ProfileOutput::Set { id, profile: updated }, 0))
        }
        ProfileCommand::Use { id } => {
            profile::set_active(&id)?;
            Ok((ProfileOutput::Use { id }, 0))
        }
    }
}
