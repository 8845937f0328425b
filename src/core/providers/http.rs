//! Blocking JSON transport shared by the two provider clients.

use crate::error::{Error, Result};
use crate::providers::Provider;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) struct Http {
    client: Client,
    base_url: String,
    provider: Provider,
}

impl Http {
    pub fn new(provider: Provider, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn apply_headers(mut request: RequestBuilder, headers: &[(&str, String)]) -> RequestBuilder {
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        request
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .map_err(|e| Error::provider_request_failed(self.provider.as_str(), e.to_string()))
    }

    fn parse<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::provider_request_failed(self.provider.as_str(), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::provider_api_error(
                self.provider.as_str(),
                status.as_u16(),
                body,
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::internal_json(
                e.to_string(),
                Some(format!("parse {} response", self.provider)),
            )
        })
    }

    pub fn get<T: DeserializeOwned>(&self, endpoint: &str, headers: &[(&str, String)]) -> Result<T> {
        let request = Self::apply_headers(self.client.get(self.url(endpoint)), headers);
        let response = self.send(request)?;
        self.parse(response)
    }

    /// GET where a 404 is a domain answer ("absent"), not an error.
    pub fn get_optional<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        headers: &[(&str, String)],
    ) -> Result<Option<T>> {
        let request = Self::apply_headers(self.client.get(self.url(endpoint)), headers);
        let response = self.send(request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.parse(response).map(Some)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        headers: &[(&str, String)],
    ) -> Result<T> {
        let request =
            Self::apply_headers(self.client.post(self.url(endpoint)).json(body), headers);
        let response = self.send(request)?;
        self.parse(response)
    }

    pub fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        headers: &[(&str, String)],
    ) -> Result<T> {
        let request = Self::apply_headers(self.client.put(self.url(endpoint)).json(body), headers);
        let response = self.send(request)?;
        self.parse(response)
    }
}

pub(crate) fn bearer(token: &str) -> Vec<(&'static str, String)> {
    vec![("Authorization", format!("Bearer {}", token))]
}
