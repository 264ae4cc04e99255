//! Request URI composition for directory API calls.

use crate::error::{Error, Result};
use url::Url;

/// Build `root/api_version[/tenant_id]/path[?query]`.
///
/// Empty segments are dropped so the result never contains `//`, and any path
/// prefix already present on `root` is kept. Path segments are appended as
/// given: existing percent-escapes such as `%2F` are not encoded a second time.
pub fn build(
    root: &str,
    api_version: &str,
    tenant_id: &str,
    include_tenant: bool,
    path: &str,
    query: &[(String, String)],
) -> Result<Url> {
    let mut url = Url::parse(root).map_err(|e| Error::MalformedRoot {
        root: root.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::MalformedRoot {
            root: root.to_string(),
            reason: "not a base URI".to_string(),
        });
    }

    let mut segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    segments.extend(api_version.split('/').filter(|s| !s.is_empty()));
    if include_tenant {
        segments.extend(tenant_id.split('/').filter(|s| !s.is_empty()));
    }
    segments.extend(path.split('/').filter(|s| !s.is_empty()));

    let joined = format!("/{}", segments.join("/"));
    url.set_path(&joined);
    url.set_fragment(None);

    if query.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(None);
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url)
}

/// Split a relative continuation link such as `directoryObjects?$skiptoken=X`
/// into its path and decoded query pairs.
pub fn split_relative(link: &str) -> (String, Vec<(String, String)>) {
    let (path, query) = link.split_once('?').unwrap_or((link, ""));
    let params = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (path.to_string(), params)
}
