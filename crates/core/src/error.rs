use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SalesError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown schema '{0}': expected one of: sales, product_data")]
    UnknownSchema(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
}
