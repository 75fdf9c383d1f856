/// Log tags identify the subsystem a message comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Engine,
    Guard,
    Ledger,
    History,
    Tasks,
    Notify,
    Config,
    Database,
    Other(String),
}

impl LogTag {
    /// Key used by `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Engine => "engine".to_string(),
            LogTag::Guard => "guard".to_string(),
            LogTag::Ledger => "ledger".to_string(),
            LogTag::History => "history".to_string(),
            LogTag::Tasks => "tasks".to_string(),
            LogTag::Notify => "notify".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Database => "database".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uncolored label for file output
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::Other(s) => s.to_uppercase(),
            other => other.to_debug_key().to_uppercase(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
