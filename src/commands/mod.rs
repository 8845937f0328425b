use serde_json::Value;

pub type CmdResult<T> = airlift::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod auth;
pub mod deploy;
pub mod profile;
pub mod serve;
pub mod status;

/// Parse a JSON object from an inline string or `@file` reference.
pub fn read_json_spec(spec: &str) -> airlift::Result<Value> {
    let raw = if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(airlift::Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }
        std::fs::read_to_string(path).map_err(|e| {
            airlift::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
        })?
    } else {
        spec.to_string()
    };

    serde_json::from_str(&raw)
        .map_err(|e| airlift::Error::validation_invalid_json(e, Some("parse JSON spec".to_string())))
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (airlift::Result<serde_json::Value>, i32) {
    crate::tty::status("airlift is working...");

    match command {
        crate::Commands::Profile(args) => dispatch!(args, global, profile),
        crate::Commands::Auth(args) => dispatch!(args, global, auth),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Status(args) => dispatch!(args, global, status),

        // Serve never reaches JSON dispatch; main runs it directly.
        crate::Commands::Serve(_) => {
            let err = airlift::Error::validation_invalid_argument(
                "output_mode",
                "Serve command uses raw output mode",
                None,
                None,
            );
            crate::output::map_cmd_result_to_json::<serde_json::Value>(Err(err))
        }
    }
}
