use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::credential::ApiKey;
use crate::dispatcher::{Dispatcher, DispatcherState};
use crate::error::{CallError, InitError, ShutdownError};
use crate::job::JobTicket;
use crate::quota::QuotaSnapshot;
use crate::routing::{Interface, UrlBuilder};
use crate::transport::{Transport, UreqTransport};
use crate::types::{ApiRequest, JsonObject, RequestParams};

/// Entry point for Steam Web API calls.
///
/// Safe to share between threads: every call is validated on the calling
/// thread, then funnelled through one [`Dispatcher`] so quotas hold no
/// matter how many callers there are.
pub struct SteamGateway {
    dispatcher: Dispatcher,
    urls: UrlBuilder,
    credential: Option<ApiKey>,
    call_timeout: Option<Duration>,
}

impl SteamGateway {
    /// Gateway over HTTP using the system clock.
    pub fn new(settings: &Settings) -> Result<Self, InitError> {
        Self::with_transport(settings, Arc::new(UreqTransport::new()), Arc::new(SystemClock))
    }

    pub fn with_transport(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InitError> {
        settings.validate()?;
        let urls = UrlBuilder::new(
            &settings.steam_api_base_url,
            settings.steam_api_default_version,
        )?;
        let credential = settings.credential()?;
        let dispatcher = Dispatcher::with_clock(settings.dispatcher(), transport, clock)?;

        tracing::info!(
            "Steam gateway ready: base_url={}, key={}",
            urls.base_url(),
            credential
                .as_ref()
                .map_or_else(|| "<none>".to_string(), ApiKey::fingerprint)
        );

        Ok(Self {
            dispatcher,
            urls,
            credential,
            call_timeout: settings.call_timeout(),
        })
    }

    /// Call `endpoint` on `interface` at the default API version and wait for the result.
    pub fn call(
        &self,
        interface: Interface,
        endpoint: &str,
        params: RequestParams,
    ) -> Result<JsonObject, CallError> {
        self.submit(interface, endpoint, None, params)
            .and_then(|ticket| self.wait(ticket))
    }

    pub fn call_versioned(
        &self,
        interface: Interface,
        endpoint: &str,
        version: u32,
        params: RequestParams,
    ) -> Result<JsonObject, CallError> {
        self.submit(interface, endpoint, Some(version), params)
            .and_then(|ticket| self.wait(ticket))
    }

    /// Call a pre-built URL under the configured base.
    ///
    /// The path is not checked against the endpoint catalog, but a URL on any
    /// other host is rejected before the key is attached.
    pub fn call_url(&self, url: &str, params: RequestParams) -> Result<JsonObject, CallError> {
        self.urls.check(url)?;
        let request = self.prepare(url.to_string(), params)?;
        let ticket = self.dispatcher.submit(request)?;
        self.wait(ticket)
    }

    /// Validate and queue a call, returning a ticket to collect the result later.
    pub fn submit(
        &self,
        interface: Interface,
        endpoint: &str,
        version: Option<u32>,
        params: RequestParams,
    ) -> Result<JobTicket, CallError> {
        let url = self.urls.build(interface, endpoint, version)?;
        let request = self.prepare(url, params)?;
        self.dispatcher.submit(request)
    }

    pub fn quota(&self) -> QuotaSnapshot {
        self.dispatcher.quota()
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.dispatcher.shutdown()
    }

    fn prepare(&self, url: String, params: RequestParams) -> Result<ApiRequest, CallError> {
        let method = params.method;
        let query = params.into_query(self.credential.as_ref())?;
        Ok(ApiRequest::new(url, method, query))
    }

    fn wait(&self, ticket: JobTicket) -> Result<JsonObject, CallError> {
        match self.call_timeout {
            Some(timeout) => ticket.wait_timeout(timeout),
            None => ticket.wait(),
        }
    }
}
