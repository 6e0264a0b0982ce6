//! The non-blocking fetch interface the pipeline is driven through.

use ts::Buffer;

/// Handle for an in-flight open or read request. Zero is invalid.
pub type RequestId = u32;

/// Handle for an opened resource.
pub type ResourceId = u64;

/// Completion state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPoll {
    /// The request handle was not recognized.
    Invalid,
    /// Still in flight; poll again on the next update.
    Pending,
    /// Done. For an open request the value is the resource handle; for a
    /// read request it is the byte count delivered.
    Complete(u64),
    /// The request failed.
    Error,
}

/// Host-supplied, non-blocking resource access.
///
/// Every method returns immediately. The pipeline issues a request
/// (`open`, `read`), then polls it once per `update()` until it leaves
/// `Pending`. Implementations decide what a URL means — HTTP, a file
/// tree, a test fixture — and own all actual I/O.
pub trait FetchIo {
    /// Begin opening the resource at `url`. Returns 0 if the request
    /// could not even be issued.
    fn open(&mut self, url: &str) -> RequestId;

    /// Poll an open request. On `Complete`, the value is the resource
    /// handle to read from.
    fn poll(&mut self, request: RequestId) -> FetchPoll;

    /// Total size in bytes of an opened resource.
    fn size(&mut self, resource: ResourceId) -> u64;

    /// Begin reading `len` bytes from an opened resource. Returns 0 if
    /// the request could not be issued.
    fn read(&mut self, resource: ResourceId, len: u64) -> RequestId;

    /// Poll a read request. On `Complete`, the delivered bytes have been
    /// appended to `dst` (clipped to its write space) and the value is
    /// the byte count.
    fn poll_read(&mut self, request: RequestId, dst: &mut Buffer) -> FetchPoll;

    /// Release an opened resource.
    fn close(&mut self, resource: ResourceId);
}
