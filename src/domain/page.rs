/// Largest page a listing hands out in one response.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Requested page of a listing, both values starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page_size: i64,
    page_number: i64,
}

impl PageRequest {
    pub fn parse(page_size: i64, page_number: i64) -> Result<PageRequest, String> {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(format!(
                "{} is not a valid page size, expected a value between 1 and {}",
                page_size, MAX_PAGE_SIZE
            ));
        }
        if page_number < 1 {
            return Err(format!("{} is not a valid page number", page_number));
        }
        if (page_number - 1).checked_mul(page_size).is_none() {
            return Err(format!("{} is not a valid page number", page_number));
        }

        Ok(Self {
            page_size,
            page_number,
        })
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn page_number(&self) -> i64 {
        self.page_number
    }

    pub fn offset(&self) -> i64 {
        (self.page_number - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_number: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: PageRequest, total_items: i64) -> Self {
        let total_items = total_items.max(0);
        let total_pages =
            total_items / page.page_size + i64::from(total_items % page.page_size != 0);

        Self {
            current_page: page.page_number,
            page_size: page.page_size,
            total_pages,
            total_items,
            has_previous: page.page_number > 1,
            has_next: page.page_number < total_pages,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}
