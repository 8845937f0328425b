use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{auth, deploy, profile, serve, status};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "airlift")]
#[command(version = VERSION)]
#[command(about = "Build, authenticate, deploy, and DNS-wire a service across a compute and an edge platform")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage deployment profiles
    #[command(visible_alias = "profiles")]
    Profile(profile::ProfileArgs),
    /// Authenticate with the compute and edge providers
    Auth(auth::AuthArgs),
    /// Run the deployment workflow
    Deploy(deploy::DeployArgs),
    /// Show cached settings and credential state
    Status(status::StatusArgs),
    /// Serve deployments over an HTTP event stream
    Serve(serve::ServeArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    // Serve is a long-running raw-output command; everything else renders
    // the JSON response envelope.
    if let Commands::Serve(args) = &cli.command {
        return match serve::run(args) {
            Ok(code) => std::process::ExitCode::from(exit_code_to_u8(code)),
            Err(err) => {
                output::print_json_result(Err(err));
                std::process::ExitCode::from(1)
            }
        };
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    output::print_json_result(json_result);
    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
