//! Steam Web API client with quota enforcement.
//!
//! Every call goes through a single dispatcher thread that executes requests
//! in FIFO order and gates each one on two quotas: a daily call budget and a
//! sliding burst window. Callers on any thread get a blocking, synchronous
//! API; the dispatcher is the only place outbound traffic originates.

mod clock;
mod config;
mod credential;
mod dispatcher;
mod error;
mod gateway;
mod job;
pub mod logging;
mod queue;
mod quota;
mod routing;
mod ssrf;
mod transport;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DispatcherConfig, QuotaConfig, Settings, DEFAULT_BASE_URL, DEFAULT_SETTINGS_FILE};
pub use credential::{ApiKey, CREDENTIAL_PARAM};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use error::{CallError, InitError, ShutdownError, TransportError, ValidationError};
pub use gateway::SteamGateway;
pub use job::{JobOutcome, JobTicket};
pub use queue::{JobQueue, PushError};
pub use quota::{Admission, QuotaSnapshot, QuotaTracker};
pub use routing::{Endpoint, Interface, UrlBuilder};
pub use ssrf::{is_private_ip, validate_base_url};
pub use transport::{Transport, TransportResponse, UreqTransport};
pub use types::{ApiRequest, HttpMethod, JsonObject, RequestParams};
