//! Pagination envelope: `{data, meta, links}`.
//!
//! Links keep every query parameter of the original request except `page`,
//! so filters, sort and search survive navigation.

use axum::http::Uri;
use serde::Serialize;
use warden_core::query::{Page, PageMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
  pub first: String,
  pub last:  String,
  pub prev:  Option<String>,
  pub next:  Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
  pub data:  Vec<T>,
  pub meta:  PageMeta,
  pub links: PageLinks,
}

impl<T> Paginated<T> {
  pub fn new(page: Page<T>, uri: &Uri) -> Self {
    let meta = page.meta;
    let current = meta.current_page;
    let links = PageLinks {
      first: page_url(uri, 1),
      last:  page_url(uri, meta.last_page),
      prev:  (current > 1).then(|| page_url(uri, current - 1)),
      next:  (current < meta.last_page).then(|| page_url(uri, current + 1)),
    };
    Self { data: page.data, meta, links }
  }
}

fn page_url(uri: &Uri, page: u64) -> String {
  let page = format!("page={page}");
  let mut pairs: Vec<&str> = uri
    .query()
    .unwrap_or_default()
    .split('&')
    .filter(|pair| !pair.is_empty() && *pair != "page" && !pair.starts_with("page="))
    .collect();
  pairs.push(&page);
  format!("{}?{}", uri.path(), pairs.join("&"))
}

#[cfg(test)]
mod tests {
  use warden_core::query::Pagination;

  use super::*;

  fn paginated(uri: &str, page: u64, total: u64) -> Paginated<u64> {
    let pagination = Pagination::new(Some(page), Some(10), 10);
    let rows = total.saturating_sub(pagination.offset()).min(10);
    let data = (0..rows).collect();
    Paginated::new(Page::new(data, total, pagination), &uri.parse().unwrap())
  }

  #[test]
  fn links_preserve_other_parameters() {
    let p = paginated("/users?search=ann&page=2&sort=%5B%5D", 2, 35);
    assert_eq!(p.links.first, "/users?search=ann&sort=%5B%5D&page=1");
    assert_eq!(p.links.last, "/users?search=ann&sort=%5B%5D&page=4");
    assert_eq!(p.links.prev.as_deref(), Some("/users?search=ann&sort=%5B%5D&page=1"));
    assert_eq!(p.links.next.as_deref(), Some("/users?search=ann&sort=%5B%5D&page=3"));
    assert_eq!(p.meta.from, Some(11));
    assert_eq!(p.meta.to, Some(20));
  }

  #[test]
  fn single_page_has_no_neighbours() {
    let p = paginated("/roles", 1, 0);
    assert_eq!(p.links.first, "/roles?page=1");
    assert_eq!(p.links.last, "/roles?page=1");
    assert_eq!(p.links.prev, None);
    assert_eq!(p.links.next, None);
    assert!(p.data.is_empty());
  }
}
