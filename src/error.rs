use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    #[error("attempt timed out after {0} ms")]
    Timeout(u64),
    #[error("acquisition failed after {attempts} attempt(s): {cause}")]
    Acquisition {
        attempts: u32,
        #[source]
        cause: Box<Error>,
    },
    #[error("alert callback error: {0}")]
    Callback(String),
    #[error("delivery via {channel} failed: {cause}")]
    Delivery {
        channel: String,
        #[source]
        cause: Box<Error>,
    },
}
