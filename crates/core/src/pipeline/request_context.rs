/// Per-request values threaded explicitly through a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// Creates a context with a random 16-hex-digit request id.
    pub fn new() -> Self {
        Self {
            request_id: format!("{:016x}", rand::random::<u64>()),
        }
    }

    pub fn with_id(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
