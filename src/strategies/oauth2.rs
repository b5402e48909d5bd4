//! Delegated login via the OAuth2 authorization-code flow.
//!
//! The strategy handles the callback leg only: it exchanges the `code`
//! query parameter for an access token, fetches the profile resource with
//! that token and hands the JSON to a caller-supplied [`ProfileMapper`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use serde::Deserialize;
use tracing::debug;

use crate::context::AuthContext;
use crate::error::{AuthError, SetupError};
use crate::strategies::query_param;
use crate::strategy::Strategy;
use crate::user::{Attributes, SharedUser};

pub const DEFAULT_CODE_PARAM: &str = "code";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds an identity from the fetched profile JSON.
///
/// Receives the request context so implementations can resolve the profile
/// against a [`UserStore`](crate::UserStore). Plain closures over the profile
/// implement it too.
#[async_trait]
pub trait ProfileMapper: Send + Sync {
    async fn map_profile(&self, ctx: &AuthContext, profile: &Attributes) -> Result<SharedUser, AuthError>;
}

#[async_trait]
impl<F> ProfileMapper for F
where
    F: Fn(&Attributes) -> Result<SharedUser, AuthError> + Send + Sync,
{
    async fn map_profile(&self, _ctx: &AuthContext, profile: &Attributes) -> Result<SharedUser, AuthError> {
        self(profile)
    }
}

#[derive(Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    /// Provider's authorization endpoint, used for the login redirect
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub code_param: String,
    pub extract_user: Arc<dyn ProfileMapper>,
}

impl OAuth2Config {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
        extract_user: Arc<dyn ProfileMapper>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: String::new(),
            token_url: token_url.into(),
            redirect_url: String::new(),
            userinfo_url: userinfo_url.into(),
            scopes: Vec::new(),
            code_param: DEFAULT_CODE_PARAM.to_string(),
            extract_user,
        }
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = url.into();
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// URL to send the browser to for login, carrying `state`.
    pub fn authorization_url(&self, state: &str) -> Result<url::Url, url::ParseError> {
        let mut url = url::Url::parse(&self.auth_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id);
            if !self.redirect_url.is_empty() {
                query.append_pair("redirect_uri", &self.redirect_url);
            }
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
        }
        Ok(url)
    }
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct OAuth2Strategy {
    config: OAuth2Config,
    client: reqwest::Client,
}

impl OAuth2Strategy {
    pub const NAME: &'static str = "oauth2";

    pub fn new(config: OAuth2Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: OAuth2Config, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .header(http::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                debug!("Token endpoint unreachable: {}", e);
                AuthError::Unauthorized
            })?;

        if !response.status().is_success() {
            debug!("Token exchange failed with HTTP {}", response.status());
            return Err(AuthError::Unauthorized);
        }

        let token = response.json::<TokenResponse>().await.map_err(|e| {
            debug!("Unreadable token response: {}", e);
            AuthError::Unauthorized
        })?;

        if token.access_token.is_empty() {
            return Err(AuthError::Unauthorized);
        }
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Attributes, AuthError> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                debug!("Profile endpoint unreachable: {}", e);
                AuthError::Unauthorized
            })?;

        if !response.status().is_success() {
            debug!("Profile fetch failed with HTTP {}", response.status());
            return Err(AuthError::Unauthorized);
        }

        response.json::<Attributes>().await.map_err(|e| {
            debug!("Unreadable profile: {}", e);
            AuthError::Unauthorized
        })
    }
}

#[async_trait]
impl Strategy for OAuth2Strategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self) -> Result<(), SetupError> {
        let missing = [
            ("client_id", &self.config.client_id),
            ("token_url", &self.config.token_url),
            ("userinfo_url", &self.config.userinfo_url),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty());

        match missing {
            Some((field, _)) => Err(SetupError::new(Self::NAME, format!("{} is required", field))),
            None => Ok(()),
        }
    }

    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError> {
        let code = query_param(request, &self.config.code_param).ok_or(AuthError::Unauthorized)?;

        let access_token = ctx.guard(self.exchange_code(&code)).await?;
        let profile = ctx.guard(self.fetch_profile(&access_token)).await?;

        ctx.guard(self.config.extract_user.map_profile(ctx, &profile))
            .await
            .map_err(AuthError::into_unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryUserStore, UserStore};
    use crate::user::SimpleUser;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn id_mapper() -> Arc<dyn ProfileMapper> {
        Arc::new(|profile: &Attributes| -> Result<SharedUser, AuthError> {
            let id = profile
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or(AuthError::UserNotFound)?;
            Ok(SimpleUser::new(id).with_attributes(profile.clone()).shared())
        })
    }

    /// Maps a provider login to a local account keyed `github:<login>`.
    struct LinkedAccounts {
        users: InMemoryUserStore,
    }

    #[async_trait]
    impl ProfileMapper for LinkedAccounts {
        async fn map_profile(&self, ctx: &AuthContext, profile: &Attributes) -> Result<SharedUser, AuthError> {
            let login = profile
                .get("login")
                .and_then(|v| v.as_str())
                .ok_or(AuthError::UserNotFound)?;
            self.users.find_user_by_id(ctx, &format!("github:{}", login)).await
        }
    }

    fn strategy(server: &MockServer) -> OAuth2Strategy {
        strategy_with(server, id_mapper())
    }

    fn strategy_with(server: &MockServer, mapper: Arc<dyn ProfileMapper>) -> OAuth2Strategy {
        let config = OAuth2Config::new(
            "client-1",
            "shh",
            format!("{}/token", server.uri()),
            format!("{}/userinfo", server.uri()),
            mapper,
        )
        .redirect_url("https://app.example.com/callback");
        OAuth2Strategy::new(config).unwrap()
    }

    fn callback(uri: &str) -> Parts {
        http::Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=testcode"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "testtoken", "token_type": "Bearer"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_callback_success() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer testtoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "email": "u1@example.com"})))
            .expect(1)
            .mount(&server)
            .await;

        let user = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode&state=xyz"))
            .await
            .unwrap();

        assert_eq!(user.id(), "u1");
        assert_eq!(user.attributes()["email"], json!("u1@example.com"));
    }

    #[tokio::test]
    async fn test_missing_code_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_rejected_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad code"))
            .mount(&server)
            .await;

        let result = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback?code=wrong"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_profile_error_status() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_undecodable_profile() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_mapper_error_collapses_to_unauthorized() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "no-id"})))
            .mount(&server)
            .await;

        let result = strategy(&server)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_mapper_resolves_profile_against_store() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "login": "octo"})))
            .mount(&server)
            .await;

        let mapper = Arc::new(LinkedAccounts {
            users: InMemoryUserStore::new([SimpleUser::new("github:octo")
                .with_attribute("role", "admin")
                .shared()]),
        });
        let user = strategy_with(&server, mapper)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode"))
            .await
            .unwrap();

        assert_eq!(user.id(), "github:octo");
        assert_eq!(user.attributes()["role"], json!("admin"));
    }

    #[tokio::test]
    async fn test_unlinked_profile_is_unauthorized() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "stranger"})))
            .mount(&server)
            .await;

        let mapper = Arc::new(LinkedAccounts {
            users: InMemoryUserStore::default(),
        });
        let result = strategy_with(&server, mapper)
            .authenticate(&AuthContext::new(), &callback("/callback?code=testcode"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_slow_provider_hits_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "t"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let ctx = AuthContext::with_timeout(Duration::from_millis(50));
        let result = strategy(&server)
            .authenticate(&ctx, &callback("/callback?code=testcode"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[test]
    fn test_setup_requires_endpoints() {
        let config = OAuth2Config::new("", "s", "https://p/token", "https://p/me", id_mapper());
        let err = OAuth2Strategy::new(config).unwrap().setup().unwrap_err();
        assert_eq!(err.reason(), "client_id is required");

        let config = OAuth2Config::new("c", "s", "https://p/token", "", id_mapper());
        assert!(OAuth2Strategy::new(config).unwrap().setup().is_err());
    }

    #[test]
    fn test_authorization_url() {
        let config = OAuth2Config::new("client-1", "s", "https://p/token", "https://p/me", id_mapper())
            .auth_url("https://p/authorize")
            .redirect_url("https://app/cb")
            .scopes(["openid", "email"]);

        let url = config.authorization_url("st8").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/authorize");
        assert!(pairs.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(pairs.contains(&("redirect_uri".to_string(), "https://app/cb".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "openid email".to_string())));
        assert!(pairs.contains(&("state".to_string(), "st8".to_string())));
    }
}
