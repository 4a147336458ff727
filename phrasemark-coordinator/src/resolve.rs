//! Document identity by url, used when a handle has gone stale.

use url::Url;

use crate::host::OpenDocument;

/// Compares two urls ignoring query string and fragment.
pub fn same_document(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(mut a), Ok(mut b)) => {
            for url in [&mut a, &mut b] {
                url.set_query(None);
                url.set_fragment(None);
            }
            a == b
        }
        _ => strip_query(a) == strip_query(b),
    }
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

pub fn find_by_url<'a>(documents: &'a [OpenDocument], url: &str) -> Option<&'a OpenDocument> {
    documents.iter().find(|doc| same_document(&doc.url, url))
}
