pub mod retry;
pub mod transport;

pub use retry::{RetryPolicy, RetryingTransport};
pub use transport::{HttpTransport, Method, Request, Response, StatusClass, Transport};
