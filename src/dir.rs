use tokio::sync::OnceCell;

use crate::{api, error::Result, req::req_get};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary director URL to connect to.
    Other(&'a str),
}

impl<'a> DirectoryUrl<'a> {
    pub(crate) fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Named resources listed in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    NewNonce,
    NewAccount,
    NewOrder,
}

impl Resource {
    pub(crate) fn url_in(self, directory: &api::Directory) -> &str {
        match self {
            Resource::NewNonce => &directory.new_nonce,
            Resource::NewAccount => &directory.new_account,
            Resource::NewOrder => &directory.new_order,
        }
    }
}

/// Directory fetched on first use and kept for the lifetime of the transport.
///
/// Concurrent first users wait on the same fetch; nobody sees a partially filled directory.
#[derive(Debug)]
pub(crate) struct DirectoryCache {
    url: String,
    directory: OnceCell<api::Directory>,
}

impl DirectoryCache {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            directory: OnceCell::new(),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn get(&self, client: &reqwest::Client) -> Result<&api::Directory> {
        self.directory
            .get_or_try_init(|| async {
                log::debug!("Fetch directory: {}", self.url);
                let res = req_get(client, &self.url).await?;
                res.json::<api::Directory>()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_resolve_in_directory() {
        let dir = api::Directory {
            new_nonce: "n".to_owned(),
            new_account: "a".to_owned(),
            new_order: "o".to_owned(),
            ..Default::default()
        };

        assert_eq!(Resource::NewNonce.url_in(&dir), "n");
        assert_eq!(Resource::NewAccount.url_in(&dir), "a");
        assert_eq!(Resource::NewOrder.url_in(&dir), "o");
    }

    #[tokio::test]
    async fn test_directory_fetched_once() {
        let server = crate::test::with_directory_server(crate::test::Script::default());
        let client = crate::req::http_client().unwrap();
        let cache = DirectoryCache::new(&server.dir_url);

        let (a, b) = tokio::join!(cache.get(&client), cache.get(&client));
        assert_eq!(a.unwrap(), b.unwrap());
        cache.get(&client).await.unwrap();

        assert_eq!(server.count_requests("/directory"), 1);
    }
}
