// Adapters behind the app ports

pub mod delay;
pub mod http_client;

pub use delay::TokioDelay;
pub use http_client::ReqwestHttp;
