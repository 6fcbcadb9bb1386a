use std::sync::Arc;

use kv_mux::{Pool, StreamHooks};

use crate::message::{Command, Request, Response};

fn new_request() -> Request {
    Request {
        seq: 0,
        cmd: Command::Cancel,
        expires_at: 0,
        key: Vec::with_capacity(1 << 9),
        val: Vec::with_capacity(1 << 14),
    }
}

fn new_response() -> Response {
    Response {
        seq: 0,
        code: crate::message::ResponseCode::None,
        expires_at: 0,
        val: Vec::with_capacity(1 << 14),
    }
}

/// Builds the server-side hooks: inbound `Request`s are recycled into `requests`,
/// cancel frames are recognized by `cmd == Cancel`. The server never needs to
/// construct a cancel message of its own, so `make_cancel` is absent.
pub fn server_hooks(requests: Arc<Pool<Request>>) -> StreamHooks<Request, Response> {
    StreamHooks {
        in_release: Arc::new(move |mut req: Request| {
            req.reset();
            requests.release(req);
        }),
        make_cancel: None,
        is_cancel: Arc::new(|req: &Request| req.cmd == Command::Cancel),
    }
}

/// Builds the client-side hooks: inbound `Response`s are recycled into `responses`,
/// and an abandoned [`kv_mux::PendingRequest`] fires a `Command::Cancel` request
/// carrying the pooled-request shape `ReqCancel` builds in the original.
pub fn client_hooks(
    requests: Arc<Pool<Request>>,
    responses: Arc<Pool<Response>>,
) -> StreamHooks<Response, Request> {
    StreamHooks {
        in_release: Arc::new(move |mut resp: Response| {
            resp.reset();
            responses.release(resp);
        }),
        make_cancel: Some(Arc::new(move || {
            let mut req = requests.acquire();
            req.reset();
            req
        })),
        is_cancel: Arc::new(|_resp: &Response| false),
    }
}

/// A process-wide pool of reusable [`Request`] values, mirroring the original's
/// `sync.Pool` with `NewRequest` as the `New` func.
pub fn request_pool() -> Pool<Request> {
    Pool::new(new_request)
}

/// A process-wide pool of reusable [`Response`] values, mirroring `NewResponse`.
pub fn response_pool() -> Pool<Response> {
    Pool::new(new_response)
}
