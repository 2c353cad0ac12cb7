use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("SOAP error: {0}")]
    Soap(#[from] soap_client::SoapError),

    #[error("Parse error: {0}")]
    Parse(#[from] upnp_parser::ParseError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] upnp_discovery::DiscoveryError),

    #[error("Callback server error: {0}")]
    Server(#[from] callback_server::ServerError),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("No active {0}")]
    NoActiveDevice(&'static str),

    #[error("Control point has shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ControlError>;
