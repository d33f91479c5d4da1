//! Query Builder pagination operations

use super::builder::SelectQuery;

impl SelectQuery {
    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET), pages start at 1
    pub fn paginate(mut self, per_page: u64, page: u64) -> Self {
        self.limit = Some(per_page);
        self.offset = Some(page.saturating_sub(1) * per_page);
        self
    }
}
