//! Fetched-page data model.

use scurry_queue::FetchItem;

use crate::parser::ParseData;

/// One fetched page: the item it answers, the response metadata, and the
/// size-capped payload. Lives only for the duration of one worker's
/// processing of one item.
#[derive(Debug, Clone)]
pub struct Page {
    pub item: FetchItem,
    pub status_code: u16,
    /// Raw payload, at most the configured maximum download size.
    pub content: Vec<u8>,
    /// For example `"text/html; charset=UTF-8"`.
    pub content_type: Option<String>,
    /// For example `"UTF-8"`.
    pub charset: Option<String>,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Populated by the content parser.
    pub parse: Option<ParseData>,
}

impl Page {
    pub fn new(item: FetchItem, status_code: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            item,
            status_code,
            content: Vec::new(),
            content_type: None,
            charset: None,
            headers,
            parse: None,
        }
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
