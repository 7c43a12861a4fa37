//! GitHub API client: REST mutations through octocrab, PR lookup through
//! one aliased GraphQL query.

use crate::error::{Error, Result};
use crate::github::repo::parse_repo_from_url;
use crate::retry::{retry, RetryConfig};
use async_trait::async_trait;
use octocrab::models::IssueState;
use octocrab::Octocrab;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write;

/// Essential fields of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrInfo {
    pub number: u64,
    pub state: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub is_draft: bool,
}

/// Optional fields for updating a PR.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrOpts {
    pub title: Option<String>,
    pub body: Option<String>,
    pub base: Option<String>,
    pub draft: Option<bool>,
}

/// GitHub operations needed by the send pipeline. The live client and the
/// in-process test double share only this capability set.
#[async_trait]
pub trait GitHubService: Send + Sync {
    async fn create_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<PrInfo>;

    async fn update_pr(&self, number: u64, opts: UpdatePrOpts) -> Result<()>;

    async fn comment_on_pr(&self, number: u64, body: &str) -> Result<()>;

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()>;

    /// Returns the login of the authenticated user.
    async fn get_viewer(&self) -> Result<String>;

    /// Returns open PRs matching the given head branch names, most recently
    /// updated first. Branches without an open PR are absent from the map.
    async fn lookup_prs_by_branch(&self, branches: &[String]) -> Result<HashMap<String, PrInfo>>;

    fn owner(&self) -> &str;
    fn repo(&self) -> &str;
}

/// Live GitHub client for the repository parsed from a remote URL.
pub struct GitHubClient {
    octo: Octocrab,
    http: reqwest::Client,
    owner: String,
    repo: String,
    token: String,
    graphql_url: String,
    retry_cfg: RetryConfig,
}

impl GitHubClient {
    /// Creates a client for the repository named by `remote_url`. When
    /// `api_url` is set it overrides the API root (GitHub Enterprise or
    /// testing); the GraphQL endpoint is derived as `<root>/graphql`.
    pub fn new(token: &str, remote_url: &str, api_url: Option<&str>) -> Result<Self> {
        let (owner, repo) = parse_repo_from_url(remote_url)?;

        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(url) = api_url {
            builder = builder.base_uri(url).map_err(|e| Error::Api(e.to_string()))?;
        }
        let octo = builder.build().map_err(|e| Error::Api(e.to_string()))?;

        let graphql_url = match api_url {
            Some(url) => format!("{}/graphql", url.trim_end_matches('/')),
            None => "https://api.github.com/graphql".to_string(),
        };

        Ok(Self {
            octo,
            http: reqwest::Client::new(),
            owner,
            repo,
            token: token.to_string(),
            graphql_url,
            retry_cfg: RetryConfig::default(),
        })
    }

    /// Overrides the retry policy (used by tests to avoid long sleeps).
    pub fn with_retry_config(mut self, cfg: RetryConfig) -> Self {
        self.retry_cfg = cfg;
        self
    }

    /// Fetches the GraphQL node id of a PR, needed for draft-state mutations.
    async fn pr_node_id(&self, number: u64) -> Result<String> {
        let pr = self
            .octo
            .pulls(&self.owner, &self.repo)
            .get(number)
            .await?;
        pr.node_id
            .ok_or_else(|| Error::Api(format!("PR #{number} has no node id")))
    }

    /// Toggles the draft state via GraphQL; the REST API cannot change it.
    async fn set_draft(&self, number: u64, draft: bool) -> Result<()> {
        let node_id = self.pr_node_id(number).await?;
        let mutation = if draft {
            "mutation($id: ID!) { convertPullRequestToDraft(input: { pullRequestId: $id }) { pullRequest { number } } }"
        } else {
            "mutation($id: ID!) { markPullRequestReadyForReview(input: { pullRequestId: $id }) { pullRequest { number } } }"
        };
        let response: serde_json::Value = self
            .octo
            .graphql(&serde_json::json!({
                "query": mutation,
                "variables": { "id": node_id },
            }))
            .await?;
        if let Some(errors) = response.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(Error::Api(format!("GraphQL error: {}", errors[0])));
            }
        }
        Ok(())
    }
}

fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PrInfo {
    let state = match pr.state {
        Some(IssueState::Open) => "OPEN",
        Some(IssueState::Closed) => "CLOSED",
        _ => "UNKNOWN",
    };
    PrInfo {
        number: pr.number,
        state: state.to_string(),
        url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone().unwrap_or_default(),
        head_ref_name: pr.head.ref_field.clone(),
        base_ref_name: pr.base.ref_field.clone(),
        is_draft: pr.draft.unwrap_or(false),
    }
}

#[async_trait]
impl GitHubService for GitHubClient {
    async fn create_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<PrInfo> {
        let pr = retry(&self.retry_cfg, || async {
            self.octo
                .pulls(&self.owner, &self.repo)
                .create(title, head, base)
                .body(body.to_string())
                .draft(draft)
                .send()
                .await
                .map_err(Error::from)
        })
        .await?;
        Ok(pr_from_octocrab(&pr))
    }

    async fn update_pr(&self, number: u64, opts: UpdatePrOpts) -> Result<()> {
        if opts.title.is_some() || opts.body.is_some() || opts.base.is_some() {
            retry(&self.retry_cfg, || async {
                let pulls = self.octo.pulls(&self.owner, &self.repo);
                let mut req = pulls.update(number);
                if let Some(title) = &opts.title {
                    req = req.title(title.clone());
                }
                if let Some(body) = &opts.body {
                    req = req.body(body.clone());
                }
                if let Some(base) = &opts.base {
                    req = req.base(base.clone());
                }
                req.send().await.map_err(Error::from)
            })
            .await?;
        }
        if let Some(draft) = opts.draft {
            retry(&self.retry_cfg, || self.set_draft(number, draft)).await?;
        }
        Ok(())
    }

    async fn comment_on_pr(&self, number: u64, body: &str) -> Result<()> {
        retry(&self.retry_cfg, || async {
            self.octo
                .issues(&self.owner, &self.repo)
                .create_comment(number, body)
                .await
                .map_err(Error::from)
        })
        .await?;
        Ok(())
    }

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        retry(&self.retry_cfg, || async {
            self.octo
                .pulls(&self.owner, &self.repo)
                .request_reviews(number, reviewers.to_vec(), Vec::<String>::new())
                .await
                .map_err(Error::from)
        })
        .await?;
        Ok(())
    }

    async fn get_viewer(&self) -> Result<String> {
        let user = retry(&self.retry_cfg, || async {
            self.octo.current().user().await.map_err(Error::from)
        })
        .await?;
        Ok(user.login)
    }

    async fn lookup_prs_by_branch(&self, branches: &[String]) -> Result<HashMap<String, PrInfo>> {
        if branches.is_empty() {
            return Ok(HashMap::new());
        }

        let query = build_pr_query(branches);
        let payload = serde_json::json!({
            "query": query,
            "variables": { "owner": self.owner, "repo": self.repo },
        });

        // Retry server errors only; client errors surface immediately.
        let (status, raw) = retry(&self.retry_cfg, || async {
            let resp = self
                .http
                .post(&self.graphql_url)
                .header("Authorization", format!("bearer {}", self.token))
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await?;
            let status = resp.status();
            let raw = resp.bytes().await?;
            if status.is_server_error() {
                return Err(Error::Api(format!(
                    "GitHub API returned {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&raw)
                )));
            }
            Ok((status, raw))
        })
        .await?;

        if status.as_u16() != 200 {
            return Err(Error::Api(format!(
                "GitHub API returned {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&raw)
            )));
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            data: Option<EnvelopeData>,
            #[serde(default)]
            errors: Vec<GraphQlError>,
        }
        #[derive(Deserialize)]
        struct EnvelopeData {
            #[serde(default)]
            repository: Option<HashMap<String, PrNodes>>,
        }
        #[derive(Deserialize, Default)]
        struct PrNodes {
            #[serde(default)]
            nodes: Vec<PrInfo>,
        }
        #[derive(Deserialize)]
        struct GraphQlError {
            message: String,
        }

        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|e| Error::Parse(format!("parsing GraphQL response: {e}")))?;

        if let Some(err) = envelope.errors.first() {
            return Err(Error::Api(format!("GraphQL errors: {}", err.message)));
        }

        let repository = envelope
            .data
            .and_then(|d| d.repository)
            .unwrap_or_default();
        let mut out = HashMap::with_capacity(branches.len());
        for (i, branch) in branches.iter().enumerate() {
            let alias = format!("b{i}");
            if let Some(nodes) = repository.get(&alias) {
                if let Some(pr) = nodes.nodes.first() {
                    out.insert(branch.clone(), pr.clone());
                }
            }
        }
        Ok(out)
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn repo(&self) -> &str {
        &self.repo
    }
}

/// Builds one aliased GraphQL query requesting the most recently updated
/// open PR for each branch.
fn build_pr_query(branches: &[String]) -> String {
    let mut b = String::from(
        "query($owner:String!,$repo:String!){repository(owner:$owner,name:$repo){",
    );
    for (i, branch) in branches.iter().enumerate() {
        let escaped = branch.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = write!(
            b,
            "b{i}:pullRequests(headRefName:\"{escaped}\",first:1,states:[OPEN],orderBy:{{field:UPDATED_AT,direction:DESC}}){{nodes{{number state url title body headRefName baseRefName isDraft}}}}"
        );
    }
    b.push_str("}}");
    b
}

/// Looks up the authenticated user's login without a repository context.
/// Used by `jip auth status`.
pub async fn viewer_login(token: &str, api_url: Option<&str>) -> Result<String> {
    let mut builder = Octocrab::builder().personal_token(token.to_string());
    if let Some(url) = api_url {
        builder = builder.base_uri(url).map_err(|e| Error::Api(e.to_string()))?;
    }
    let octo = builder.build().map_err(|e| Error::Api(e.to_string()))?;
    let user = octo.current().user().await?;
    Ok(user.login)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_query_aliases_each_branch() {
        let query = build_pr_query(&["feat-a".to_string(), "feat-b".to_string()]);
        assert!(query.contains("b0:pullRequests(headRefName:\"feat-a\""));
        assert!(query.contains("b1:pullRequests(headRefName:\"feat-b\""));
        assert!(query.contains("states:[OPEN]"));
        assert!(query.contains("orderBy:{field:UPDATED_AT,direction:DESC}"));
    }

    #[test]
    fn pr_query_escapes_quotes_and_backslashes() {
        let query = build_pr_query(&[r#"we"ird\name"#.to_string()]);
        assert!(query.contains(r#"headRefName:"we\"ird\\name""#));
    }

    #[test]
    fn pr_info_deserializes_graphql_node() {
        let json = r#"{"number":7,"state":"OPEN","url":"https://github.com/o/r/pull/7","title":"t","body":"b","headRefName":"h","baseRefName":"main","isDraft":false}"#;
        let pr: PrInfo = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.head_ref_name, "h");
        assert_eq!(pr.base_ref_name, "main");
        assert!(!pr.is_draft);
    }
}
