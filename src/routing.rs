//! Steam Web API routing: which endpoints each interface serves, and how
//! their URLs are laid out (`{base}/{interface}/{endpoint}/v{version}/`).

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::ssrf::validate_base_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    SteamCharts,
    SteamUserStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetMostPlayedGames,
    GetNumberOfCurrentPlayers,
}

impl Interface {
    pub const ALL: [Interface; 2] = [Interface::SteamCharts, Interface::SteamUserStats];

    pub fn as_str(self) -> &'static str {
        match self {
            Interface::SteamCharts => "ISteamChartsService",
            Interface::SteamUserStats => "ISteamUserStats",
        }
    }

    /// Endpoints this interface is known to serve.
    pub fn endpoints(self) -> &'static [Endpoint] {
        match self {
            Interface::SteamCharts => &[Endpoint::GetMostPlayedGames],
            Interface::SteamUserStats => &[Endpoint::GetNumberOfCurrentPlayers],
        }
    }

    /// Resolve an endpoint name against this interface's set.
    pub fn endpoint(self, name: &str) -> Result<Endpoint, ValidationError> {
        self.endpoints()
            .iter()
            .copied()
            .find(|e| e.as_str() == name)
            .ok_or_else(|| ValidationError::EndpointNotInInterface {
                interface: self.as_str().to_string(),
                endpoint: name.to_string(),
            })
    }
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::GetMostPlayedGames => "GetMostPlayedGames",
            Endpoint::GetNumberOfCurrentPlayers => "GetNumberOfCurrentPlayers",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interface::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownInterface(s.to_string()))
    }
}

/// Builds fully qualified endpoint URLs against a validated base.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base_url: String,
    default_version: u32,
}

impl UrlBuilder {
    pub fn new(base_url: &str, default_version: u32) -> Result<Self, ValidationError> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            default_version: default_version.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for `endpoint` on `interface`; fails if the interface does not serve it.
    pub fn build(
        &self,
        interface: Interface,
        endpoint: &str,
        version: Option<u32>,
    ) -> Result<String, ValidationError> {
        let endpoint = interface.endpoint(endpoint)?;
        let version = version.unwrap_or(self.default_version);
        Ok(format!(
            "{}/{}/{}/v{}/",
            self.base_url, interface, endpoint, version
        ))
    }

    /// Accept a pre-built URL only if it lives under the configured base.
    ///
    /// The credential is attached to every request, so nothing may leave for
    /// a host other than the validated base.
    pub fn check(&self, url: &str) -> Result<(), ValidationError> {
        let under_base = url
            .strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if !under_base {
            return Err(ValidationError::BaseUrl(format!(
                "{url} is outside {}",
                self.base_url
            )));
        }
        Ok(())
    }
}
