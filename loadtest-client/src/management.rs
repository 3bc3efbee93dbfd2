//! Management portal endpoints used by the run.

use serde::Deserialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use loadtest_core::{
    Created, DataError, ExpectedStatus, LoadTestResult, Lookup, ProtocolError, ResourceDto,
    ResourceKind, TokenPair,
};

use crate::auth::ClientCredentials;
use crate::options::ClientOptions;
use crate::transport::{BoxedTransport, HttpRequest, HttpResponse};

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairResponse {
    token_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaTokenResponse {
    refresh_token: Option<String>,
}

fn required(value: Option<String>, operation: &str, field: &str) -> LoadTestResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DataError::new(operation, field).into())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Client of the management portal under its path prefix.
#[derive(Clone)]
pub struct ManagementClient {
    transport: BoxedTransport,
    prefix: String,
}

impl ManagementClient {
    pub fn new(transport: BoxedTransport, options: &ClientOptions) -> Self {
        Self {
            transport,
            prefix: options.management_path.trim_end_matches('/').to_string(),
        }
    }

    fn path(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Password grant for the admin user. Returns the admin access token.
    pub async fn password_grant(
        &self,
        client: &ClientCredentials,
        username: &str,
        password: &str,
    ) -> LoadTestResult<String> {
        const OPERATION: &str = "Authentication";
        let request = HttpRequest::post(OPERATION, self.path("/oauth/token"))
            .header("Authorization", client.basic_header())
            .form(&[
                ("grant_type", "password"),
                ("client_id", client.client_id.as_str()),
                ("username", username),
                ("password", password),
            ]);
        let response = self.send(request, &ExpectedStatus::one(200)).await?;
        let token: TokenResponse = response.json(OPERATION)?;
        required(token.access_token, OPERATION, "access_token")
    }

    /// Refresh grant with the pairing client. The refresh token is spent.
    pub async fn refresh_grant(
        &self,
        client: &ClientCredentials,
        refresh_token: &str,
    ) -> LoadTestResult<TokenPair> {
        const OPERATION: &str = "Refresh token";
        let request = HttpRequest::post(OPERATION, self.path("/oauth/token"))
            .header("Authorization", client.basic_header())
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]);
        let response = self.send(request, &ExpectedStatus::one(200)).await?;
        let token: TokenResponse = response.json(OPERATION)?;
        let pair = TokenPair::new(
            required(token.access_token, OPERATION, "access_token")?,
            required(token.refresh_token, OPERATION, "refresh_token")?,
        );
        Ok(match token.expires_in {
            Some(expires_in) => pair.with_expiry(unix_now() + expires_in),
            None => pair,
        })
    }

    pub async fn get_organization(&self, token: &str, name: &str) -> LoadTestResult<Lookup> {
        let request = HttpRequest::get(
            "Get organization",
            self.path(&format!("/api/organizations/{}", name)),
        )
        .bearer(token);
        self.lookup(request, ResourceKind::Organization, name).await
    }

    pub async fn create_organization(&self, token: &str, name: &str, body: Value) -> LoadTestResult<Created> {
        let request = HttpRequest::post("Create organization", self.path("/api/organizations"))
            .bearer(token)
            .json(body);
        self.create(request, ResourceKind::Organization, name).await
    }

    pub async fn get_project(&self, token: &str, name: &str) -> LoadTestResult<Lookup> {
        let request = HttpRequest::get("Get project", self.path(&format!("/api/projects/{}", name)))
            .bearer(token);
        self.lookup(request, ResourceKind::Project, name).await
    }

    pub async fn create_project(&self, token: &str, name: &str, body: Value) -> LoadTestResult<Created> {
        let request = HttpRequest::post("Create project", self.path("/api/projects"))
            .bearer(token)
            .json(body);
        self.create(request, ResourceKind::Project, name).await
    }

    pub async fn find_source_type(&self, token: &str, name: &str) -> LoadTestResult<Lookup> {
        let request = HttpRequest::get("Get source types", self.path("/api/source-types")).bearer(token);
        self.lookup_in_list(request, ResourceKind::SourceType, "name", name).await
    }

    pub async fn create_source_type(&self, token: &str, name: &str, body: Value) -> LoadTestResult<Created> {
        let request = HttpRequest::post("Create source type", self.path("/api/source-types"))
            .bearer(token)
            .json(body);
        self.create(request, ResourceKind::SourceType, name).await
    }

    /// Project source by its source name.
    pub async fn find_source(&self, token: &str, source_name: &str) -> LoadTestResult<Lookup> {
        let request = HttpRequest::get("Get project sources", self.path("/api/sources")).bearer(token);
        self.lookup_in_list(request, ResourceKind::Source, "sourceName", source_name)
            .await
    }

    pub async fn create_source(&self, token: &str, source_name: &str, body: Value) -> LoadTestResult<Created> {
        let request = HttpRequest::post("Create project source", self.path("/api/sources"))
            .bearer(token)
            .json(body);
        self.create(request, ResourceKind::Source, source_name).await
    }

    /// Subject by external id; the first match wins.
    pub async fn find_subject(&self, token: &str, external_id: &str) -> LoadTestResult<Lookup> {
        let request = HttpRequest::get("Get subject", self.path("/api/subjects"))
            .query("externalId", external_id)
            .bearer(token);
        let response = self.send(request, &ExpectedStatus::any_of(&[200, 404])).await?;
        if response.status == 404 {
            return Ok(Lookup::NotFound);
        }
        let body: Value = response.json("Get subject")?;
        let first = match body {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            _ => return Ok(Lookup::NotFound),
        };
        Ok(Lookup::from_body(ResourceKind::Subject, external_id, first))
    }

    pub async fn create_subject(&self, token: &str, external_id: &str, body: Value) -> LoadTestResult<Created> {
        let request = HttpRequest::post("Create new subject", self.path("/api/subjects"))
            .bearer(token)
            .json(body);
        self.create(request, ResourceKind::Subject, external_id).await
    }

    /// Requests a pairing meta-token for a subject. Returns its token name.
    pub async fn pair_client(&self, token: &str, client_id: &str, login: &str) -> LoadTestResult<String> {
        const OPERATION: &str = "PairApp - Get meta token";
        let request = HttpRequest::get(OPERATION, self.path("/api/oauth-clients/pair"))
            .query("clientId", client_id)
            .query("login", login)
            .query("persistent", "true")
            .bearer(token)
            .not_retryable();
        let response = self.send(request, &ExpectedStatus::one(200)).await?;
        let pair: PairResponse = response.json(OPERATION)?;
        required(pair.token_name, OPERATION, "tokenName")
    }

    /// Exchanges a meta-token for the subject's first refresh token.
    pub async fn meta_token(&self, token: &str, token_name: &str) -> LoadTestResult<String> {
        const OPERATION: &str = "PairApp - Get refresh token";
        let request = HttpRequest::get(OPERATION, self.path(&format!("/api/meta-token/{}", token_name)))
            .bearer(token)
            .not_retryable();
        let response = self.send(request, &ExpectedStatus::one(200)).await?;
        let meta: MetaTokenResponse = response.json(OPERATION)?;
        required(meta.refresh_token, OPERATION, "refreshToken")
    }

    async fn send(&self, request: HttpRequest, expected: &ExpectedStatus) -> LoadTestResult<HttpResponse> {
        let name = request.name.clone();
        self.transport.execute(request).await?.expect(&name, expected)
    }

    async fn lookup(&self, request: HttpRequest, kind: ResourceKind, key: &str) -> LoadTestResult<Lookup> {
        let name = request.name.clone();
        let response = self.send(request, &ExpectedStatus::any_of(&[200, 404])).await?;
        if response.status == 404 {
            return Ok(Lookup::NotFound);
        }
        Ok(Lookup::from_body(kind, key, response.json(&name)?))
    }

    async fn lookup_in_list(
        &self,
        request: HttpRequest,
        kind: ResourceKind,
        match_field: &str,
        key: &str,
    ) -> LoadTestResult<Lookup> {
        let name = request.name.clone();
        let response = self.send(request, &ExpectedStatus::one(200)).await?;
        let items: Vec<Value> = response.json(&name)?;
        let found = items
            .into_iter()
            .find(|item| item.get(match_field).and_then(Value::as_str) == Some(key));
        Ok(match found {
            Some(item) => Lookup::from_body(kind, key, item),
            None => Lookup::NotFound,
        })
    }

    async fn create(&self, request: HttpRequest, kind: ResourceKind, key: &str) -> LoadTestResult<Created> {
        let name = request.name.clone();
        let response = self.transport.execute(request).await?;
        match response.status {
            201 => {
                let dto = ResourceDto::new(kind, key, response.json(&name)?);
                if dto.identifier().is_none() {
                    return Err(DataError::new(name, kind.identifying_field()).into());
                }
                Ok(Created::Created(dto))
            }
            409 => Ok(Created::Conflict),
            status => Err(ProtocolError::new(name, ExpectedStatus::one(201), status, &response.body).into()),
        }
    }
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("prefix", &self.prefix)
            .finish()
    }
}
