use std::sync::Arc;

use crate::tls::TlsConfig;
use crate::Request;

use super::TransferState;


mod pool;

pub(crate) fn get(url: &str) -> Request {
    http::Request::get(url).body(vec![]).unwrap()
}

pub(crate) fn state(request: Request) -> TransferState {
    TransferState::new(request, Arc::new(TlsConfig::default()), "because::test")
}
