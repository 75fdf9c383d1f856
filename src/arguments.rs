/// Centralized command-line flag handling
///
/// Logger flags (`--debug-<tag>`, `--verbose`, `--verbose-<tag>`, `--quiet`)
/// are read from the raw argument list so every module can check them
/// without threading a parsed CLI struct around. The CLI parser in main.rs
/// only ever sees the arguments left after `cli_args()` strips these flags.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Prefixes of flags owned by the logger
const LOGGER_FLAG_PREFIXES: &[&str] = &["--debug-", "--verbose-"];
const LOGGER_FLAGS: &[&str] = &["--verbose", "--quiet"];

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        // Poisoned mutex: fall back to the process arguments
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

/// Returns true when the argument is a logger flag
pub fn is_logger_flag(arg: &str) -> bool {
    LOGGER_FLAGS.contains(&arg) || LOGGER_FLAG_PREFIXES.iter().any(|p| arg.starts_with(p))
}

/// Arguments with all logger flags removed, suitable for the CLI parser
pub fn cli_args() -> Vec<String> {
    get_cmd_args()
        .into_iter()
        .filter(|a| !is_logger_flag(a))
        .collect()
}

/// Tag keys passed as `--debug-<key>`
pub fn debug_tag_keys() -> Vec<String> {
    get_cmd_args()
        .iter()
        .filter_map(|a| a.strip_prefix("--debug-").map(|k| k.to_lowercase()))
        .collect()
}

/// Tag keys passed as `--verbose-<key>`
pub fn verbose_tag_keys() -> Vec<String> {
    get_cmd_args()
        .iter()
        .filter_map(|a| a.strip_prefix("--verbose-").map(|k| k.to_lowercase()))
        .collect()
}

/// Global verbose mode
pub fn is_verbose_mode() -> bool {
    has_arg("--verbose")
}

/// Quiet mode - only errors reach the console
pub fn is_quiet_mode() -> bool {
    has_arg("--quiet")
}
