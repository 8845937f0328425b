use clap::{Args, Subcommand};
use serde::Serialize;

use airlift::auth::{ensure_token, AuthContext, AuthOverrides, ComputeAuth, EdgeAuth};
use airlift::deadline::Deadline;
use airlift::prompt::DirectIoPrompter;
use airlift::providers::{ComputeApi, ComputeClient, EdgeApi, EdgeClient, Provider};
use airlift::secrets::{self, FsSecretStore};
use airlift::settings;

use super::CmdResult;

#[derive(Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    command: AuthCommand,
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Authenticate with a provider and persist the credential
    Login {
        /// Provider: compute or edge
        provider: String,

        /// Token supplied out of band (skips interactive acquisition)
        #[arg(long)]
        token: Option<String>,

        /// Edge only: mint a scoped token from an elevated credential
        #[arg(long)]
        bootstrap: bool,

        /// Compute organization preference
        #[arg(long)]
        organization: Option<String>,

        /// Compute region preference
        #[arg(long)]
        region: Option<String>,

        /// Edge zone preference
        #[arg(long)]
        zone: Option<String>,

        /// Accept optional-capability warnings without asking
        #[arg(long)]
        yes: bool,
    },

    /// Verify stored credentials against the providers
    Status,

    /// Remove stored credentials for a provider
    Logout {
        /// Provider: compute or edge
        provider: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum AuthOutput {
    #[serde(rename_all = "camelCase")]
    Login { provider: Provider, authenticated: bool },
    #[serde(rename_all = "camelCase")]
    Status {
        compute: ProviderStatus,
        edge: ProviderStatus,
    },
    #[serde(rename_all = "camelCase")]
    Logout { provider: Provider },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub token_present: bool,
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

fn parse_provider(value: &str) -> airlift::Result<Provider> {
    Provider::parse(value).ok_or_else(|| {
        airlift::Error::validation_invalid_argument(
            "provider",
            "Unknown provider",
            Some(value.to_string()),
            Some(vec!["compute".to_string(), "edge".to_string()]),
        )
    })
}

pub fn run(args: AuthArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<AuthOutput> {
    match args.command {
        AuthCommand::Login {
            provider,
            token,
            bootstrap,
            organization,
            region,
            zone,
            yes,
        } => {
            let provider = parse_provider(&provider)?;
            if bootstrap && provider != Provider::Edge {
                return Err(airlift::Error::validation_invalid_argument(
                    "bootstrap",
                    "Privileged bootstrap is an edge-provider flow",
                    None,
                    None,
                ));
            }

            let store = FsSecretStore::default_location()?;
            let prompter = DirectIoPrompter::stdio();
            let user = secrets::current_user();
            let ctx = AuthContext {
                store: &store,
                user: &user,
                prompter: &prompter,
                deadline: Deadline::none(),
                overrides: AuthOverrides {
                    organization,
                    region,
                    zone,
                    token,
                    edge_bootstrap: bootstrap,
                },
                auto_accept_warnings: yes,
            };

            match provider {
                Provider::Compute => {
                    let api = ComputeClient::from_env();
                    ensure_token(&ComputeAuth::new(&api), &ctx)?;
                }
                Provider::Edge => {
                    let api = EdgeClient::from_env();
                    ensure_token(&EdgeAuth::new(&api), &ctx)?;
                }
            }

            Ok((
                AuthOutput::Login {
                    provider,
                    authenticated: true,
                },
                0,
            ))
        }

        AuthCommand::Status => {
            let store = FsSecretStore::default_location()?;
            let user = secrets::current_user();

            let compute_token = secrets::load_token(&store, &user, Provider::Compute)?;
            let compute_settings = settings::load_compute(&store, &user)?;
            let compute_verified = compute_token.as_deref().map(|token| {
                ComputeClient::from_env().verify_token(token).is_ok()
            });

            let edge_token = secrets::load_token(&store, &user, Provider::Edge)?;
            let edge_settings = settings::load_edge(&store, &user)?;
            let edge_verified = edge_token
                .as_deref()
                .map(|token| EdgeClient::from_env().verify_token(token).is_ok());

            Ok((
                AuthOutput::Status {
                    compute: ProviderStatus {
                        token_present: compute_token.is_some(),
                        verified: compute_verified,
                        organization: compute_settings.as_ref().map(|s| s.organization.clone()),
                        region: compute_settings.map(|s| s.region),
                        zone: None,
                    },
                    edge: ProviderStatus {
                        token_present: edge_token.is_some(),
                        verified: edge_verified,
                        organization: None,
                        region: None,
                        zone: edge_settings.and_then(|s| s.zone),
                    },
                },
                0,
            ))
        }

        AuthCommand::Logout { provider } => {
            let provider = parse_provider(&provider)?;
            let store = FsSecretStore::default_location()?;
            secrets::forget_tokens(&store, &secrets::current_user(), provider)?;
            Ok((AuthOutput::Logout { provider }, 0))
        }
    }
}
