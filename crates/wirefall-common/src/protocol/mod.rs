pub mod error;
pub mod requests;
pub mod responses;


pub use error::{Result, WirefallError};
pub use requests::{EnvelopeCodec, MethodName, RequestEnvelope, RequestId};
pub use responses::{ResponseEnvelope, RpcErrorBody};
