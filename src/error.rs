use thiserror::Error;

/// Top-level error returned by the library entry points.
#[derive(Debug, Error)]
pub enum BellowsError {
    #[error("Configuration error:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Task graph error:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Error while running tasks:\n{0}")]
    Runner(#[from] RunnerError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read the configuration file.\n{0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Couldn't parse the configuration file.\n{0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is declared twice")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Task graph contains a cycle through '{0}'")]
    Cycle(String),

    #[error("Couldn't compile watch pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Worker result channel closed unexpectedly")]
    ChannelClosed,
}

/// Errors from wiping the output directory. Unlike pipeline transform
/// errors, these fail the owning task outright.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct CleanError(#[from] pub std::io::Error);

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("Couldn't bind the live-reload socket.\n{0}")]
    Bind(std::io::Error),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Recv(#[from] std::sync::mpsc::RecvError),
}
