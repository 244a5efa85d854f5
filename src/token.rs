use std::cell::Cell;

/// Identifies one asynchronous request. Later requests get larger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Monotonic token source. A response is applied only if its token is still
/// the newest one issued; anything older is stale and gets dropped.
#[derive(Debug, Default)]
pub struct RequestTokens {
    latest: Cell<u64>,
}

impl RequestTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestToken {
        let next = self.latest.get() + 1;
        self.latest.set(next);
        RequestToken(next)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest.get()
    }
}
