use http::{HeaderMap, Method};
use std::net::SocketAddr;

/// The parts of an inbound request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub peer: SocketAddr,
}

impl<'a> RequestInfo<'a> {
    pub fn new(method: &'a Method, path: &'a str, headers: &'a HeaderMap, peer: SocketAddr) -> Self {
        Self { method, path, headers, peer }
    }

    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
