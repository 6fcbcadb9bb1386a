use kv_protocol::{Response, ResponseCode};

pub fn error_response(message: &str) -> Response {
    Response {
        seq: 0,
        code: ResponseCode::Error,
        expires_at: 0,
        val: message.as_bytes().to_vec(),
    }
}
