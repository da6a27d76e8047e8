pub mod common;
pub mod envelope;
pub mod odds;
pub mod request;
pub mod response;

pub use common::*;
pub use envelope::{RawResponseEnvelope, RequestEnvelope, ResponseEnvelope};
pub use odds::Odds;
pub use request::*;
pub use response::*;
