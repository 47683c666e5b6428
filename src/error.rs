use std::{env::VarError, io::Error as IO_ERROR};

use anyhow::Error as ANYHOW_ERROR;
use base64::DecodeError as BASE64_DECODE_ERROR;
use bigdecimal::ParseBigDecimalError as BIG_DECIMAL_ERROR;
use bincode::Error as BINCODE_ERROR;
use hex::FromHexError as HEX_ERROR;
use reqwest::Error as REQWEST_ERROR;
use serde_json::Error as JSON_ERROR;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WS_ERROR;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use url::ParseError as URL_ERROR;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    URL(#[from] URL_ERROR),

    #[error("{0}")]
    VAR(#[from] VarError),

    #[error("{0}")]
    Base64DecodeError(#[from] BASE64_DECODE_ERROR),

    #[error("{0}")]
    BigDecimalError(#[from] BIG_DECIMAL_ERROR),

    #[error("{0}")]
    HexError(#[from] HEX_ERROR),

    #[error("{0}")]
    BincodeError(#[from] BINCODE_ERROR),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("{0}")]
    ReqwestError(#[from] REQWEST_ERROR),

    #[error("{0}")]
    WS(#[from] WS_ERROR),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("{0}")]
    AnyHowError(#[from] ANYHOW_ERROR),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid option {option}")]
    InvalidOption { option: String },

    #[error("Missing params: {0}")]
    MissingParams(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Wallet {0} is not a required signer of the transaction")]
    SignerNotFound(String),

    #[error("No live quote to submit")]
    NoQuote,

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Lock poisoned: {0}")]
    LockError(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}
