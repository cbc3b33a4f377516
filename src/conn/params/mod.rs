mod connect_params;
mod connect_params_builder;
mod cp_url;

pub use self::connect_params::{ConnectParams, ServerCerts, Tls};
pub use self::connect_params_builder::ConnectParamsBuilder;
pub use self::cp_url::IntoConnectParams;
