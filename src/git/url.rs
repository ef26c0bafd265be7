use std::fmt;

/// `owner/repo` pair used to address a repository on the hosting API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    /// Parse a clone URL and extract owner/repo information
    ///
    /// Strips the protocol, any embedded credentials, the host and the `.git`
    /// suffix. Handles scp-like SSH (`git@host:owner/repo.git`), `ssh://`,
    /// `https://` and `http://` forms.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();

        let path = if let Some((_, rest)) = url.split_once("://") {
            // Drop the authority: `user:token@host:port`
            rest.split_once('/')?.1
        } else if let Some((host, path)) = url.split_once(':') {
            // scp-like syntax requires a host part and no slash before the colon
            if host.is_empty() || host.contains('/') {
                return None;
            }
            path
        } else {
            return None;
        };

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        // Enterprise installs may nest groups, keep the last two segments
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let [.., owner, repo] = parts.as_slice() else {
            return None;
        };

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
