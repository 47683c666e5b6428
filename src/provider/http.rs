use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    configuration::Config,
    error::{self, Error},
    handler::balances::alias_native_balance,
    model::LeaderboardSort,
    types::{
        Balances, RefInfo, RefListItem, SwapQuoteRequest, SwapQuoteResponse,
        SwapSubmitRequest,
    },
};

use super::api::{BalanceApi, ReferralApi, SwapApi};

#[derive(Debug)]
pub struct HTTP {
    pub config: Config,
    pub http: Client,
}

impl HTTP {
    pub fn new(config: Config) -> Result<HTTP, Error> {
        let http = match Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                return Err(error::Error::ReqwestError(e));
            },
        };

        Ok(HTTP { config, http })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

impl ReferralApi for HTTP {
    async fn ref_info(&self, code: &str) -> Result<RefInfo, Error> {
        let url = Url::parse(&self.config.ref_info_url(code))?;
        self.get_json(url).await
    }

    async fn ref_list(
        &self,
        sort: LeaderboardSort,
    ) -> Result<Vec<RefListItem>, Error> {
        let url = Url::parse_with_params(
            &self.config.ref_list_url(),
            &[("sort", sort.as_str())],
        )?;
        self.get_json(url).await
    }
}

impl SwapApi for HTTP {
    async fn swap_quote(
        &self,
        request: &SwapQuoteRequest,
    ) -> Result<SwapQuoteResponse, Error> {
        let url = Url::parse_with_params(
            &self.config.swap_url(),
            request.query_pairs(),
        )?;
        self.get_json(url).await
    }

    async fn submit_swap(
        &self,
        request: &SwapSubmitRequest,
    ) -> Result<serde_json::Value, Error> {
        let url = self.config.swap_url();
        debug!("POST {} request {}", url, request.request_id);

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json::<serde_json::Value>().await?)
    }
}

impl BalanceApi for HTTP {
    async fn balances(&self, wallet: &str) -> Result<Balances, Error> {
        let url = Url::parse(&self.config.balances_url(wallet))?;
        let mut balances: Balances = self.get_json(url).await?;

        alias_native_balance(
            &mut balances,
            &self.config.native_symbol,
            &self.config.wrapped_native_address,
        );

        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::oneshot,
    };

    /// Serves one canned response and hands back the request line.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let (sender, receiver) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];

            loop {
                let read = socket.read(&mut buffer).await.unwrap();
                request.extend_from_slice(&buffer[..read]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|value| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length || read == 0 {
                        break;
                    }
                }
                if read == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            let text = String::from_utf8_lossy(&request);
            let line = text.lines().next().unwrap_or_default().to_owned();
            let _ = sender.send(line);
        });

        (host, receiver)
    }

    fn client(api_host: &str, balances_host: &str) -> HTTP {
        HTTP::new(Config {
            api_host: api_host.to_owned(),
            balances_host: balances_host.to_owned(),
            timeout: 5,
            ..Config::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (host, request) =
            serve_once("500 Internal Server Error", r#"{"error":"down"}"#).await;
        let http = client(&host, &host);

        let result = http.ref_info("alpha").await;
        assert!(matches!(
            result,
            Err(Error::HttpStatus { status: 500, ref url }) if url.ends_with("/ref/alpha")
        ));
        assert_eq!(request.await.unwrap(), "GET /ref/alpha HTTP/1.1");
    }

    #[tokio::test]
    async fn test_failed_submit_is_reported() {
        let (host, request) = serve_once("502 Bad Gateway", "").await;
        let http = client(&host, &host);
        let submit = SwapSubmitRequest {
            txn: String::from("AQID"),
            request_id: String::from("r-1"),
        };

        let result = http.submit_swap(&submit).await;
        assert!(matches!(result, Err(Error::HttpStatus { status: 502, .. })));
        assert_eq!(request.await.unwrap(), "POST /swap HTTP/1.1");
    }

    #[tokio::test]
    async fn test_swap_quote_is_decoded() {
        let (host, request) = serve_once(
            "200 OK",
            r#"{"price":0.02,"transaction":"AQID","requestId":"r-7"}"#,
        )
        .await;
        let http = client(&host, &host);
        let quote = SwapQuoteRequest {
            address: String::from("Bonk1"),
            amount: BigDecimal::from(50),
            address_from: None,
            wallet_address: None,
            referral: None,
        };

        let response = http.swap_quote(&quote).await.unwrap();
        assert_eq!(response.price, Some(0.02));
        assert_eq!(response.request_id.as_deref(), Some("r-7"));
        assert_eq!(
            request.await.unwrap(),
            "GET /swap?address=Bonk1&amount=50 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_balances_alias_native_entry() {
        let (host, request) = serve_once(
            "200 OK",
            r#"{"SOL":{"uiAmount":1.25,"amount":"1250000000"},"Usdc1":{"uiAmount":40.0}}"#,
        )
        .await;
        let http = client("http://127.0.0.1:9", &host);
        let wrapped = http.config.wrapped_native_address.clone();

        let balances = http.balances("Trader1").await.unwrap();

        assert_eq!(balances.len(), 3);
        assert_eq!(balances.get(&wrapped), balances.get("SOL"));
        assert_eq!(balances[&wrapped].ui_amount, 1.25);
        assert_eq!(balances["Usdc1"].ui_amount, 40.0);
        assert_eq!(request.await.unwrap(), "GET /balances/Trader1 HTTP/1.1");
    }

    #[test]
    fn test_swap_query_string() {
        let config = Config::default();
        let request = SwapQuoteRequest {
            address: String::from("Bonk1"),
            amount: BigDecimal::from(50),
            address_from: Some(String::from("Usdc1")),
            wallet_address: None,
            referral: Some(String::from("alpha")),
        };

        let url =
            Url::parse_with_params(&config.swap_url(), request.query_pairs())
                .unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.cryptoscan.pro/swap?address=Bonk1&amount=50&addressFrom=Usdc1&ref=alpha"
        );
    }

    #[test]
    fn test_ref_list_query_string() {
        let config = Config::default();
        let url = Url::parse_with_params(
            &config.ref_list_url(),
            &[("sort", LeaderboardSort::Volume.as_str())],
        )
        .unwrap();

        assert_eq!(url.as_str(), "https://api.cryptoscan.pro/ref/list?sort=");
    }
}
