/// Handle for one requested scheduler step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

/// At most one outstanding frame request, invalidated synchronously by
/// `cancel`. A token from an earlier generation never runs.
#[derive(Debug, Default)]
pub struct FrameRequests {
    generation: u64,
    pending: Option<FrameToken>,
}

impl FrameRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) -> FrameToken {
        self.generation = self.generation.wrapping_add(1);
        let token = FrameToken(self.generation);
        self.pending = Some(token);
        token
    }

    /// Returns whether a request was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    /// Consume `token` if it is the outstanding request.
    pub fn take(&mut self, token: FrameToken) -> bool {
        if self.pending == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}
