//! Shared helpers for the backend HTTP clients

use url::Url;

/// Make `url` usable as a join base by ensuring its path ends with `/`.
pub(crate) fn api_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Split an `user:secret` API key into basic-auth parts.
///
/// A key without a colon is sent as the user name with an empty password.
pub(crate) fn basic_auth_parts(api_key: &str) -> (&str, &str) {
    api_key.split_once(':').unwrap_or((api_key, ""))
}
