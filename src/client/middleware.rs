// File: ./src/client/middleware.rs
//! Tower middleware for the outgoing request headers every call needs.
use http::Request;
use http::header::{ACCEPT, HeaderValue, USER_AGENT};
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

pub fn default_user_agent() -> String {
    format!("tasksheet/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug)]
pub struct UserAgentLayer {
    pub user_agent: String,
}

impl UserAgentLayer {
    pub fn new(user_agent: String) -> Self {
        Self { user_agent }
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Sets `User-Agent`, and `Accept: application/json` unless the caller chose one.
#[derive(Clone, Debug)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: String,
}

impl<S, ReqBody> Service<Request<ReqBody>> for UserAgentService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if let Ok(val) = HeaderValue::from_str(&self.user_agent) {
            req.headers_mut().insert(USER_AGENT, val);
        }
        req.headers_mut()
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));
        self.inner.call(req)
    }
}
