use async_trait::async_trait;
use kv_mux::RequestHandle;
use kv_protocol::{Request, Response};

/// Invoked by a reader on seeing a `Redirect` entry: hands the request off to the
/// node named in the entry. Ownership of `req` passes unconditionally — ongoing
/// processing (and the eventual reply) becomes the implementor's responsibility, the
/// same handoff `storage2/lsm2.go`'s reader does by calling `db.RR.RedirectRead` and
/// `continue`-ing without touching `req` again.
#[async_trait]
pub trait RedirectReader: Send + Sync {
    async fn redirect_read(&self, target: &str, req: RequestHandle<Request, Response>);
}

/// Outcome of attempting to redirect a write that local disk space rejected.
pub enum RedirectOutcome {
    /// The write was handed off to `target`; the caller must not reply or release
    /// `req` itself — ownership has moved to the forwarding task.
    Forwarded { target: String },
    /// No redirect target was available or reachable; `req` is handed back so the
    /// caller can reply with its own error.
    Declined { req: RequestHandle<Request, Response> },
}

/// Invoked by the writer when the disk-space oracle rejects a `Put`. Unlike
/// [`RedirectReader`], ownership of `req` is conditional on the outcome — Rust's
/// ownership model expresses the original's boolean-ownership-transfer convention
/// directly as the two variants of [`RedirectOutcome`] rather than a bare `bool` plus
/// an implicit "you still own it on false" convention.
#[async_trait]
pub trait RedirectWriter: Send + Sync {
    async fn redirect_write(&self, req: RequestHandle<Request, Response>) -> RedirectOutcome;
}
