use kv_mux::Pool;
use kv_protocol::{Command, Response, ResponseCode};

use crate::engine::StoredEntry;

/// Response builders shared by the write and read pipelines, each pulling its
/// `Response` out of the shared pool and resetting it before filling it in.
pub fn error_response(pool: &Pool<Response>, message: &str) -> Response {
    let mut resp = pool.acquire();
    resp.reset();
    resp.code = ResponseCode::Error;
    resp.val = message.as_bytes().to_vec();
    resp
}

pub fn ok_response(pool: &Pool<Response>) -> Response {
    let mut resp = pool.acquire();
    resp.reset();
    resp
}

pub fn not_found_response(pool: &Pool<Response>) -> Response {
    let mut resp = pool.acquire();
    resp.reset();
    resp.code = ResponseCode::NotFound;
    resp
}

pub fn hit_response(pool: &Pool<Response>, cmd: Command, entry: &StoredEntry) -> Response {
    let mut resp = pool.acquire();
    resp.reset();
    match cmd {
        Command::Get | Command::GetNoRedirect => {
            resp.code = ResponseCode::Value;
            resp.val = entry.value.clone();
            resp.expires_at = entry.expires_at;
        }
        Command::Trace => {
            resp.code = ResponseCode::Value;
            resp.val = b"\n--ok".to_vec();
        }
        Command::Touch => {
            resp.code = ResponseCode::Value;
            resp.val = b"ok".to_vec();
        }
        _ => unreachable!("writer only forwards Get/GetNoRedirect/Touch/Trace to the read channel"),
    }
    resp
}

pub fn miss_response(pool: &Pool<Response>, cmd: Command) -> Response {
    let mut resp = pool.acquire();
    resp.reset();
    match cmd {
        Command::Get | Command::GetNoRedirect => resp.code = ResponseCode::NotFound,
        Command::Trace => {
            resp.code = ResponseCode::Value;
            resp.val = b"\n--not_found".to_vec();
        }
        Command::Touch => {
            resp.code = ResponseCode::Value;
            resp.val = b"not_found".to_vec();
        }
        _ => unreachable!("writer only forwards Get/GetNoRedirect/Touch/Trace to the read channel"),
    }
    resp
}
