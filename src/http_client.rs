use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

use crate::error::FetchError;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "moneyline-backtest/0.1";

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client, FetchError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::Request {
                url: String::new(),
                reason: format!("failed to build http client: {err}"),
            })
    })
}

/// One GET, no retry. Returns the body of a 2xx response.
pub fn get_text(url: &str) -> Result<String, FetchError> {
    let client = http_client()?;
    let resp = client.get(url).send().map_err(|err| FetchError::Request {
        url: url.to_string(),
        reason: err.to_string(),
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Transport {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    resp.text().map_err(|err| FetchError::Request {
        url: url.to_string(),
        reason: format!("failed reading body: {err}"),
    })
}
