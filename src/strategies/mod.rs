//! Bundled authentication strategies.
//!
//! | Name      | Credential source                       | Identity from                    |
//! |-----------|-----------------------------------------|----------------------------------|
//! | `apikey`  | header, else query parameter            | store credential lookup          |
//! | `jwt`     | `Authorization: Bearer <token>`         | store ID lookup, or token claims |
//! | `local`   | `Authorization: Basic ...`              | store credential lookup          |
//! | `session` | signed session cookie                   | store ID lookup                  |
//! | `oauth2`  | `code` query parameter on the callback  | caller-supplied profile mapper   |

pub mod apikey;
pub mod basic;
pub mod jwt;
pub mod oauth2;
pub mod session;

pub use apikey::{ApiKeyConfig, ApiKeyStrategy};
pub use basic::BasicAuthStrategy;
pub use jwt::{JwtConfig, JwtStrategy};
pub use oauth2::{OAuth2Config, OAuth2Strategy, ProfileMapper};
pub use session::{SessionConfig, SessionStrategy};

use http::request::Parts;

/// Non-empty header value as a string, if present and valid UTF-8.
pub(crate) fn header_str<'a>(request: &'a Parts, name: &str) -> Option<&'a str> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// First non-empty value of a query parameter.
pub(crate) fn query_param(request: &Parts, name: &str) -> Option<String> {
    let query = request.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> Parts {
        http::Request::builder()
            .uri(uri)
            .header("X-Empty", "")
            .header("X-Key", "abc")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_header_str() {
        let p = parts("/");
        assert_eq!(header_str(&p, "x-key"), Some("abc"));
        assert_eq!(header_str(&p, "X-Empty"), None);
        assert_eq!(header_str(&p, "X-Missing"), None);
    }

    #[test]
    fn test_query_param_decodes() {
        let p = parts("/cb?code=a%2Fb&state=xyz");
        assert_eq!(query_param(&p, "code"), Some("a/b".to_string()));
        assert_eq!(query_param(&p, "state"), Some("xyz".to_string()));
        assert_eq!(query_param(&p, "other"), None);
    }

    #[test]
    fn test_query_param_empty_or_absent() {
        assert_eq!(query_param(&parts("/?api_key="), "api_key"), None);
        assert_eq!(query_param(&parts("/"), "api_key"), None);
    }
}
