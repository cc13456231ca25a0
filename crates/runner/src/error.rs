use kapp_routes::RouteError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("invalid manifest for app {app}: {}", .problems.join("; "))]
    InvalidManifest { app: String, problems: Vec<String> },
    #[error("app group runner already initialized")]
    AlreadyInitialized,
    #[error("app group runner not initialized")]
    NotInitialized,
    #[error(transparent)]
    Routes(#[from] RouteError),
    #[error("app {app}: {source:#}")]
    App {
        app: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("cancelled")]
    Cancelled,
}
