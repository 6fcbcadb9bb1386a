use kv_mux::Message;
use serde::de::{self, Deserializer};
use serde::{Serialize, Serializer};
use serde_struct_tuple::{DeserializeStructTuple, SerializeStructTuple};

/// Operation a [`Request`] asks the storage endpoint to perform.
///
/// `Cancel` is a request like any other on the wire (it carries the full `Request`
/// shape, fields besides `seq` unused) rather than a distinct frame type, matching
/// how the command byte is overloaded on the wire it was ported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Cancel = 0,
    Get = 1,
    GetNoRedirect = 2,
    Put = 3,
    PutNoRedirect = 4,
    /// Returns a log of redirect hops taken to resolve a key.
    Trace = 5,
    /// Returns whether a key is present, without fetching its value.
    Touch = 6,
}

impl Command {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Command::Cancel),
            1 => Some(Command::Get),
            2 => Some(Command::GetNoRedirect),
            3 => Some(Command::Put),
            4 => Some(Command::PutNoRedirect),
            5 => Some(Command::Trace),
            6 => Some(Command::Touch),
            _ => None,
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> serde::Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Command::from_u8(value).ok_or_else(|| de::Error::custom(format!("unknown command {value}")))
    }
}

/// Outcome reported by a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    /// No result carried; used for acknowledgements such as a successful `Put`.
    None = 0,
    Error = 1,
    Value = 2,
    NotFound = 3,
}

impl ResponseCode {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResponseCode::None),
            1 => Some(ResponseCode::Error),
            2 => Some(ResponseCode::Value),
            3 => Some(ResponseCode::NotFound),
            _ => None,
        }
    }
}

impl Serialize for ResponseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> serde::Deserialize<'de> for ResponseCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        ResponseCode::from_u8(value)
            .ok_or_else(|| de::Error::custom(format!("unknown response code {value}")))
    }
}

/// A request frame: one command against one key, optionally carrying a value and an
/// expiration.
#[derive(Debug, Clone, SerializeStructTuple, DeserializeStructTuple)]
pub struct Request {
    pub seq: u64,
    pub cmd: Command,
    /// Unix timestamp the entry expires at; `0` means no expiration.
    pub expires_at: u64,
    pub key: Vec<u8>,
    pub val: Vec<u8>,
}

impl Request {
    /// Rewinds a pooled request to a cancel-shaped blank slate, keeping its buffers'
    /// allocated capacity.
    pub fn reset(&mut self) {
        self.cmd = Command::Cancel;
        self.expires_at = 0;
        self.key.clear();
        self.val.clear();
    }
}

impl Message for Request {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }
}

/// A response frame correlated to a [`Request`] by sequence number.
#[derive(Debug, Clone, SerializeStructTuple, DeserializeStructTuple)]
pub struct Response {
    pub seq: u64,
    pub code: ResponseCode,
    pub expires_at: u64,
    pub val: Vec<u8>,
}

impl Response {
    pub fn reset(&mut self) {
        self.code = ResponseCode::None;
        self.expires_at = 0;
        self.val.clear();
    }
}

impl Message for Response {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let request = Request {
            seq: 7,
            cmd: Command::Put,
            expires_at: 0,
            key: b"k".to_vec(),
            val: b"v".to_vec(),
        };
        let encoded = serde_json::to_string(&request).unwrap();
        assert_eq!(encoded, r#"[7,3,0,[107],[118]]"#);
    }

    #[test]
    fn response_round_trips_through_json() {
        let response = Response {
            seq: 7,
            code: ResponseCode::Value,
            expires_at: 0,
            val: b"v".to_vec(),
        };
        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.seq, 7);
        assert_eq!(decoded.code, ResponseCode::Value);
        assert_eq!(decoded.val, b"v".to_vec());
    }

    #[test]
    fn unknown_command_byte_is_rejected() {
        let err = serde_json::from_str::<Request>(r#"[1,9,0,[],[]]"#).unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }
}
