use std::fmt::Display;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Kubernetes
    #[error("Kubernetes error {0}")]
    Kube(#[from] kube::Error),
    #[error("kubeconfig error {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    // HTTP
    #[error("HTTP transport error {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} returned {status}: {body}")]
    RemoteStatus {
        operation: String,
        status: u16,
        body: String,
    },

    // Processes
    #[error("Command {0:?} failed: {1}")]
    CommandError(Vec<String>, String),
    #[error("required commands not found: {}", .0.join(", "))]
    MissingCommands(Vec<String>),

    // Orchestration
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Timed out waiting for operation: {0}")]
    Timeout(String),
    #[error("Cancelled while waiting for operation: {0}")]
    Cancelled(String),
    #[error("Conflicting remote state: {0}")]
    Conflict(String),

    // Misc libs
    #[error("I/O error {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid pattern {0}")]
    Regex(#[from] regex::Error),
    #[error("base64 decode error {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Error parsing value: {0}")]
    ParseHumanize(#[from] humanize_rs::ParseError),

    // Tracing
    #[error("OTLP exporter error {0}")]
    Otlp(#[from] opentelemetry::trace::TraceError),
    #[error("Failed to install tracing subscriber: {0}")]
    TracingInit(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The innermost error once all `Context` layers are peeled off.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }
}

/// Prefix an error with the operation that was being attempted.
pub trait Context<T> {
    fn context<C: Display>(self, context: C) -> Result<T, Error>;
    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T, Error>;
}

impl<T, E: Into<Error>> Context<T> for Result<T, E> {
    fn context<C: Display>(self, context: C) -> Result<T, Error> {
        self.map_err(|e| Error::Context {
            context: context.to_string(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T, Error> {
        self.map_err(|e| Error::Context {
            context: f().to_string(),
            source: Box::new(e.into()),
        })
    }
}
