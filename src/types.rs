use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::credential::{fingerprint, ApiKey, CREDENTIAL_PARAM};
use crate::error::ValidationError;

/// Successful response payload: the top-level JSON object returned by Steam.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            _ => Err(ValidationError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Caller-supplied parameters of one API call.
///
/// Extra query parameters are free-form; `access_token` overrides the
/// configured key for this call only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub method: HttpMethod,
    pub access_token: Option<String>,
    pub query: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Final query string pairs, with the credential attached.
    ///
    /// Fails when neither a per-call token nor a configured key is available.
    pub fn into_query(
        self,
        credential: Option<&ApiKey>,
    ) -> Result<Vec<(String, String)>, ValidationError> {
        let token = match (self.access_token, credential) {
            (Some(token), _) => ApiKey::new(token)?,
            (None, Some(key)) => key.clone(),
            (None, None) => return Err(ValidationError::MissingCredential),
        };

        let mut query: Vec<(String, String)> = self
            .query
            .into_iter()
            .filter(|(k, _)| k != CREDENTIAL_PARAM)
            .collect();
        query.push((CREDENTIAL_PARAM.to_string(), token.expose().to_string()));
        Ok(query)
    }
}

/// Fully resolved outbound request, as handed to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub method: HttpMethod,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(url: impl Into<String>, method: HttpMethod, query: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method,
            query,
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query: Vec<(&str, String)> = self
            .query
            .iter()
            .map(|(k, v)| {
                if k == CREDENTIAL_PARAM {
                    (k.as_str(), fingerprint(v))
                } else {
                    (k.as_str(), v.clone())
                }
            })
            .collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &query)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_defaults_to_get() {
        assert_eq!(RequestParams::new().method, HttpMethod::Get);
    }

    #[test]
    fn method_accepts_get_and_post() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
    }

    #[test]
    fn method_rejects_others() {
        for bad in ["put", "delete", ""] {
            assert_eq!(
                bad.parse::<HttpMethod>(),
                Err(ValidationError::UnsupportedMethod(bad.to_string()))
            );
        }
    }

    #[test]
    fn configured_key_is_attached() {
        let key = ApiKey::new("CONFIGURED").unwrap();
        let query = RequestParams::new()
            .param("appid", 3564740)
            .into_query(Some(&key))
            .unwrap();
        assert!(query.contains(&("appid".to_string(), "3564740".to_string())));
        assert!(query.contains(&(CREDENTIAL_PARAM.to_string(), "CONFIGURED".to_string())));
    }

    #[test]
    fn per_call_token_overrides_configured_key() {
        let key = ApiKey::new("CONFIGURED").unwrap();
        let query = RequestParams::new()
            .access_token("OVERRIDE")
            .into_query(Some(&key))
            .unwrap();
        assert_eq!(
            query,
            vec![(CREDENTIAL_PARAM.to_string(), "OVERRIDE".to_string())]
        );
    }

    #[test]
    fn missing_credential_is_rejected() {
        assert_eq!(
            RequestParams::new().into_query(None),
            Err(ValidationError::MissingCredential)
        );
    }

    #[test]
    fn debug_redacts_credential() {
        let request = ApiRequest::new(
            "https://api.steampowered.com/x/",
            HttpMethod::Get,
            vec![(CREDENTIAL_PARAM.to_string(), "TOPSECRET".to_string())],
        );
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("TOPSECRET"));
        assert!(rendered.contains("key_"));
    }
}
