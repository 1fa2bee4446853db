//! Range negotiation: did the server honour a resume request?

/// How a finished attempt relates to the resume offset it was sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeVerdict {
    /// Offset 0: no `Range` header was sent.
    NotResumed,
    /// 206: the body continues the staged bytes.
    Resumed { bytes_so_far: u64 },
    /// 200 to a ranged request: the server resent the whole body.
    RestartFromZero,
    /// 416 and the staged size equals the preflight size.
    AlreadyComplete,
    /// Anything else is an ordinary failure for the classifier.
    Classify,
}

/// Inspect one attempt. `received` is the number of body bytes appended during
/// the attempt; `probed_total` is the preflight size, if one was obtained.
pub fn negotiate(offset: u64, status: u32, received: u64, probed_total: Option<u64>) -> RangeVerdict {
    if offset == 0 {
        return RangeVerdict::NotResumed;
    }
    match status {
        206 => RangeVerdict::Resumed {
            bytes_so_far: offset + received,
        },
        200 => RangeVerdict::RestartFromZero,
        416 if probed_total == Some(offset) => RangeVerdict::AlreadyComplete,
        _ => RangeVerdict::Classify,
    }
}
