//! Client-side action runtime: a REST transport, a reducer-backed store, and
//! one sequential handler loop per action type.

pub mod actions;
pub mod browser;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod endpoints;
pub mod pagination;
pub mod sagas;
pub mod store;
pub mod transport;
pub mod ws;

pub use browser::{BrowserPort, RecordingBrowser};
pub use config::{load_settings, load_settings_from, Settings, SettingsError};
pub use context::{SagaContext, SagaServices};
pub use dispatcher::{
    DispatchError, DispatcherHandle, SagaEvent, SagaHandler, SagaRuntime, SagaRuntimeBuilder,
};
pub use store::Store;
pub use transport::{RestClient, RestError, RestResponse, ResponseData};
pub use ws::{spawn_socket_bridge, WsChannel};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
