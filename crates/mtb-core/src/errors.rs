/// Core error type for the media transfer bot.
///
/// Adapter crates map their specific errors into this type so the orchestrator can
/// tell integration failures (fatal to a run) from per-message failures (counted).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("message range starting at {start} with {count} messages exceeds the id space")]
    InvalidRange { start: i32, count: u32 },

    #[error("a multi-slot run is already in progress")]
    AlreadyRunning,

    #[error("batch runner accepted none of the known call shapes; update the candidate list ({0})")]
    AdapterExhausted(String),

    #[error("no batch runner is wired up")]
    RunnerUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
