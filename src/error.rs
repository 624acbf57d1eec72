use thiserror::Error;

/// Failure talking to the market-data provider. Callers recover locally by
/// skipping the symbol or keeping the previous watch list.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("market data request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed market data: {0}")]
    Malformed(String),
}

/// Failure delivering a message to the notification channel. Never escalated.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Built with the request URL stripped: it carries the bot token.
    #[error("notification transport failed: {0}")]
    Transport(reqwest::Error),

    #[error("notification rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}
