//! Repository authentication
//!
//! A repository's `auth` block resolves to an [`Authenticator`] that decorates
//! every request. Values come either inline or from a Secret key; a missing
//! Secret or key is a hard error, never a silent fallback to anonymous access.

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use skiff_core::{PackageRepository, SecretKeyRef};

use crate::error::{RepoError, Result};
use crate::source::RepositorySource;

/// Request decoration strategy
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Authenticator {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authenticator::None => write!(f, "None"),
            Authenticator::Basic { username, .. } => write!(f, "Basic({}:***)", username),
            Authenticator::Bearer { .. } => write!(f, "Bearer(***)"),
        }
    }
}

impl Authenticator {
    /// Authorization header value, if any
    pub fn auth_header(&self) -> Option<String> {
        match self {
            Authenticator::None => None,
            Authenticator::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                Some(format!("Basic {}", encoded))
            }
            Authenticator::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }

    /// Decorate a request
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_header() {
            Some(header) => request.header(reqwest::header::AUTHORIZATION, header),
            None => request,
        }
    }

    /// Resolve the authenticator for a repository, reading secrets from `namespace`
    pub async fn resolve(
        repo: &PackageRepository,
        source: &dyn RepositorySource,
        namespace: &str,
    ) -> Result<Self> {
        let Some(auth) = &repo.spec.auth else {
            return Ok(Authenticator::None);
        };
        let repository = repo.name_any();
        let mut resolver = SecretResolver {
            source,
            namespace,
            repository: &repository,
            cached: None,
        };

        match (&auth.basic, &auth.bearer) {
            (Some(_), Some(_)) => Err(auth_error(
                &repository,
                "basic and bearer auth are mutually exclusive",
            )),
            (Some(basic), None) => {
                let username = resolver
                    .value("username", &basic.username, &basic.username_secret_ref)
                    .await?;
                let password = resolver
                    .value("password", &basic.password, &basic.password_secret_ref)
                    .await?;
                Ok(Authenticator::Basic { username, password })
            }
            (None, Some(bearer)) => {
                let token = resolver
                    .value("token", &bearer.token, &bearer.token_secret_ref)
                    .await?;
                Ok(Authenticator::Bearer { token })
            }
            (None, None) => Ok(Authenticator::None),
        }
    }
}

fn auth_error(repository: &str, message: impl Into<String>) -> RepoError {
    RepoError::AuthConfig {
        repository: repository.to_string(),
        message: message.into(),
    }
}

/// Resolves inline-or-secret values, fetching each secret at most once in a row
struct SecretResolver<'a> {
    source: &'a dyn RepositorySource,
    namespace: &'a str,
    repository: &'a str,
    cached: Option<Secret>,
}

impl SecretResolver<'_> {
    async fn value(
        &mut self,
        field: &str,
        inline: &Option<String>,
        secret_ref: &Option<SecretKeyRef>,
    ) -> Result<String> {
        if let Some(value) = inline
            && !value.is_empty()
        {
            return Ok(value.clone());
        }

        let Some(secret_ref) = secret_ref else {
            return Err(auth_error(
                self.repository,
                format!("{} is neither set nor referenced from a secret", field),
            ));
        };

        let reuse = self
            .cached
            .as_ref()
            .is_some_and(|s| s.name_any() == secret_ref.name);
        if !reuse {
            let secret = self
                .source
                .get_secret(&secret_ref.name, self.namespace)
                .await
                .map_err(|e| {
                    auth_error(
                        self.repository,
                        format!(
                            "could not get secret {}/{}: {}",
                            self.namespace, secret_ref.name, e
                        ),
                    )
                })?;
            self.cached = Some(secret);
        }

        let secret = self.cached.as_ref().ok_or_else(|| {
            auth_error(self.repository, format!("secret {} unavailable", secret_ref.name))
        })?;
        secret_key(secret, &secret_ref.key)
            .map_err(|reason| {
                auth_error(self.repository, format!("secret {} {}", secret_ref.name, reason))
            })
    }
}

/// Read a key from a secret; `data` is already base64-decoded by the API client.
///
/// The error is the reason the key is unusable, to be prefixed with the secret name.
fn secret_key(secret: &Secret, key: &str) -> std::result::Result<String, String> {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(value.0.clone())
            .map_err(|_| format!("has a non UTF-8 value for key {}", key));
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .cloned()
        .ok_or_else(|| format!("has no key {}", key))
}
