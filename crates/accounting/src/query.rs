//! Paged account queries.

use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountState};

/// Which page to return (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    /// Zero means "use the configured default".
    #[serde(default)]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: 0,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Resolve `per_page` against the default and the hard maximum.
    pub fn normalized(self, default_per_page: u32, max_per_page: u32) -> Self {
        let per_page = match self.per_page {
            0 => default_per_page,
            n => n.min(max_per_page),
        };
        Self {
            page: self.page.max(1),
            per_page,
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.per_page as usize)
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Cut the requested page out of an already sorted, already filtered list.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total_elements = all.len() as u64;
        let total_pages = page_count(total_elements, request.per_page);
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();

        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total_elements,
            total_pages,
        }
    }
}

/// Pages needed for `total` items, saturating at `u32::MAX`.
fn page_count(total: u64, per_page: u32) -> u32 {
    let pages = total.div_ceil(u64::from(per_page.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Account search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    /// Identifier substring (case-sensitive).
    #[serde(default)]
    pub term: Option<String>,
    /// Accounts in this state are left out.
    #[serde(default)]
    pub excluded_state: Option<AccountState>,
    #[serde(default)]
    pub page: PageRequest,
}

impl AccountQuery {
    pub fn matches(&self, account: &Account) -> bool {
        if let Some(term) = &self.term {
            if !account.identifier.as_str().contains(term.as_str()) {
                return false;
            }
        }
        self.excluded_state != Some(account.state)
    }
}
