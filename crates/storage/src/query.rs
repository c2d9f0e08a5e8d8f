//! The query struct shared by every `Get*s` repository operation (§4.A).

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub conversation_id: Option<String>,
    pub tool_name: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit <= 0` means "all" (§4.A).
    pub fn effective_limit(&self) -> Option<i64> {
        if self.limit <= 0 {
            None
        } else {
            Some(self.limit)
        }
    }
}
